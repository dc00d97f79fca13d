use serde_json::json;
use sqlreact_core::config::LoadOptions;
use sqlreact_db::{connect_from_config, migrations, DemoSeedDataset, SeedResult};

use crate::commands::{build_runtime, exit, load_config, CommandResult};

pub fn run() -> CommandResult {
    run_with_options(LoadOptions::default())
}

pub fn run_with_options(options: LoadOptions) -> CommandResult {
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), exit::DATABASE))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), exit::MIGRATION))?;

        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), exit::MIGRATION))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), exit::VERIFICATION))?;

        let run_result: Result<SeedResult, (&'static str, String, u8)> =
            if verification.all_present {
                Ok(seeded)
            } else {
                let failed_checks = verification
                    .checks
                    .iter()
                    .filter_map(|(check, passed)| (!passed).then_some(*check))
                    .collect::<Vec<_>>();
                Err(("seed_verification", verification_message(&failed_checks), exit::VERIFICATION))
            };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => CommandResult::success_with_details(
            "seed",
            format!(
                "demo dataset ready: {} employees, {} departments",
                seeded.employees_seeded, seeded.departments_seeded
            ),
            Some(json!({
                "database_url": config.database.url,
                "employees": seeded.employees_seeded,
                "departments": seeded.departments_seeded,
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some demo rows failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
