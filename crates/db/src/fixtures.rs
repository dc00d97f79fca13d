use sqlx::Executor;

use crate::connection::DbPool;
use crate::errors::RepositoryError;

/// Employees the demo walkthrough expects, as `(employee_id, name, department, salary)`.
const SEED_EMPLOYEES: &[(i64, &str, &str, f64)] = &[
    (101, "Alice Smith", "Sales", 60000.0),
    (102, "Bob Johnson", "IT", 75000.0),
    (103, "Charlie Brown", "Sales", 62000.0),
    (104, "Diana Prince", "HR", 55000.0),
    (105, "Clark Kent", "IT", 80000.0),
];

/// `(dept_id, name, verification label)`.
const SEED_DEPARTMENTS: &[(i64, &str, &str)] = &[
    (1, "Sales", "department-sales"),
    (2, "IT", "department-it"),
    (3, "HR", "department-hr"),
];

/// Deterministic `Employees`/`Departments` rows for local runs and tests.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the dataset. Re-running is a no-op for rows that already exist.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            employees_seeded: SEED_EMPLOYEES.len(),
            departments_seeded: SEED_DEPARTMENTS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (employee_id, name, department, salary) in SEED_EMPLOYEES {
            let row: Option<(String, Option<String>, Option<f64>)> = sqlx::query_as(
                "SELECT name, department, salary FROM Employees WHERE employee_id = ?1",
            )
            .bind(employee_id)
            .fetch_optional(pool)
            .await?;
            let matches = row
                .map(|(stored_name, stored_department, stored_salary)| {
                    stored_name == *name
                        && stored_department.as_deref() == Some(*department)
                        && stored_salary.is_some_and(|value| (value - salary).abs() < f64::EPSILON)
                })
                .unwrap_or(false);
            checks.push((*name, matches));
        }

        for (dept_id, name, label) in SEED_DEPARTMENTS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM Departments WHERE dept_id = ?1 AND name = ?2)",
            )
            .bind(dept_id)
            .bind(name)
            .fetch_one(pool)
            .await?;
            checks.push((*label, exists == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove the seeded rows, leaving anything else in the tables untouched.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        for (employee_id, ..) in SEED_EMPLOYEES {
            sqlx::query("DELETE FROM Employees WHERE employee_id = ?1")
                .bind(employee_id)
                .execute(&mut *tx)
                .await?;
        }
        for (dept_id, ..) in SEED_DEPARTMENTS {
            sqlx::query("DELETE FROM Departments WHERE dept_id = ?1")
                .bind(dept_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub employees_seeded: usize,
    pub departments_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
