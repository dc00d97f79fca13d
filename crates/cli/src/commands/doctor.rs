use serde::Serialize;
use sqlreact_core::config::{AppConfig, LoadOptions};
use sqlreact_core::ports::SchemaProvider;
use sqlreact_db::{connect_from_config, SqliteSchemaProvider};

const DEMO_TABLES: [&str; 2] = ["Departments", "Employees"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    run_with_options(json_output, LoadOptions::default())
}

pub fn run_with_options(json_output: bool, options: LoadOptions) -> String {
    let report = build_report(options);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_credentials(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_credentials", "database_connectivity", "demo_schema"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    let provider = config.llm.provider.as_str();
    match config.llm.require_api_key() {
        Ok(Some(_)) => DoctorCheck {
            name: "llm_credentials",
            status: CheckStatus::Pass,
            details: format!("api key present for `{provider}` model `{}`", config.llm.model),
        },
        Ok(None) => DoctorCheck {
            name: "llm_credentials",
            status: CheckStatus::Pass,
            details: format!("`{provider}` does not need an api key"),
        },
        Err(error) => {
            DoctorCheck { name: "llm_credentials", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect_from_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "demo_schema",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let connectivity = DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        };
        let schema = match SqliteSchemaProvider::new(pool.clone()).describe_schema().await {
            Ok(schema) => {
                let missing = DEMO_TABLES
                    .iter()
                    .filter(|table| !schema.has_table(table))
                    .copied()
                    .collect::<Vec<_>>();
                if missing.is_empty() {
                    DoctorCheck {
                        name: "demo_schema",
                        status: CheckStatus::Pass,
                        details: format!(
                            "queryable tables: {}",
                            schema.table_names().collect::<Vec<_>>().join(", ")
                        ),
                    }
                } else {
                    DoctorCheck {
                        name: "demo_schema",
                        status: CheckStatus::Fail,
                        details: format!(
                            "missing tables {}; run `sqlreact seed`",
                            missing.join(", ")
                        ),
                    }
                }
            }
            Err(error) => DoctorCheck {
                name: "demo_schema",
                status: CheckStatus::Fail,
                details: format!("{error}; run `sqlreact seed`"),
            },
        };

        pool.close().await;
        vec![connectivity, schema]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
