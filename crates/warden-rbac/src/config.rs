use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

// RBAC framework configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct RbacConfig {
    // Role name the decorated tests run under.
    pub rbac_test_role: String,
    // Role name restored between tests.
    pub admin_role: String,
    // Master on/off switch.
    pub enable_rbac: bool,
    // ParsingError fails the test (true) or skips it (false).
    pub strict_policy_check: bool,
    // Ordered policy-file path templates, one %s slot each.
    pub custom_policy_files: Vec<String>,
    // YAML allow-list consulted when test_custom_requirements is set.
    pub custom_requirements_file: Option<PathBuf>,
    // Use the requirements authority instead of the policy authority.
    pub test_custom_requirements: bool,
    // Reporting group.
    pub enable_reporting: bool,
    pub report_log_path: PathBuf,
    pub report_log_name: String,
    // Identity service base URL.
    pub identity_url: String,
}

const DEFAULT_POLICY_TEMPLATE: &str = "/etc/%s/policy.json";
const DEFAULT_REPORT_LOG_PATH: &str = "/tmp";
const DEFAULT_REPORT_LOG_NAME: &str = "warden_report.log";
const DEFAULT_IDENTITY_URL: &str = "http://127.0.0.1:5000";

#[derive(Debug, Deserialize)]
struct RbacConfigOverride {
    rbac_test_role: Option<String>,
    admin_role: Option<String>,
    enable_rbac: Option<bool>,
    strict_policy_check: Option<bool>,
    custom_policy_files: Option<Vec<String>>,
    custom_requirements_file: Option<PathBuf>,
    test_custom_requirements: Option<bool>,
    enable_reporting: Option<bool>,
    report_log_path: Option<PathBuf>,
    report_log_name: Option<String>,
    identity_url: Option<String>,
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

impl RbacConfig {
    pub fn from_env() -> Result<Self> {
        // Environment variables provide defaults for local development.
        let rbac_test_role =
            std::env::var("WARDEN_RBAC_TEST_ROLE").unwrap_or_else(|_| "admin".to_string());
        let admin_role = std::env::var("WARDEN_ADMIN_ROLE").unwrap_or_else(|_| "admin".to_string());
        let enable_rbac = env_bool("WARDEN_ENABLE_RBAC", true);
        let strict_policy_check = env_bool("WARDEN_STRICT_POLICY_CHECK", false);
        let custom_policy_files = std::env::var("WARDEN_POLICY_FILES")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|template| !template.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|_| vec![DEFAULT_POLICY_TEMPLATE.to_string()]);
        let custom_requirements_file = std::env::var("WARDEN_REQUIREMENTS_FILE")
            .ok()
            .map(PathBuf::from);
        let test_custom_requirements = env_bool("WARDEN_TEST_CUSTOM_REQUIREMENTS", false);
        let enable_reporting = env_bool("WARDEN_ENABLE_REPORTING", false);
        let report_log_path = std::env::var("WARDEN_REPORT_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_REPORT_LOG_PATH));
        let report_log_name = std::env::var("WARDEN_REPORT_LOG_NAME")
            .unwrap_or_else(|_| DEFAULT_REPORT_LOG_NAME.to_string());
        let identity_url = std::env::var("WARDEN_IDENTITY_URL")
            .unwrap_or_else(|_| DEFAULT_IDENTITY_URL.to_string());
        Ok(Self {
            rbac_test_role,
            admin_role,
            enable_rbac,
            strict_policy_check,
            custom_policy_files,
            custom_requirements_file,
            test_custom_requirements,
            enable_reporting,
            report_log_path,
            report_log_name,
            identity_url,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("WARDEN_CONFIG") {
            // YAML overrides allow ops-friendly config files.
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read WARDEN_CONFIG: {path}"))?;
            let override_cfg: RbacConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse warden config yaml")?;
            if let Some(value) = override_cfg.rbac_test_role {
                config.rbac_test_role = value;
            }
            if let Some(value) = override_cfg.admin_role {
                config.admin_role = value;
            }
            if let Some(value) = override_cfg.enable_rbac {
                config.enable_rbac = value;
            }
            if let Some(value) = override_cfg.strict_policy_check {
                config.strict_policy_check = value;
            }
            if let Some(value) = override_cfg.custom_policy_files
                && !value.is_empty()
            {
                config.custom_policy_files = value;
            }
            if let Some(value) = override_cfg.custom_requirements_file {
                config.custom_requirements_file = Some(value);
            }
            if let Some(value) = override_cfg.test_custom_requirements {
                config.test_custom_requirements = value;
            }
            if let Some(value) = override_cfg.enable_reporting {
                config.enable_reporting = value;
            }
            if let Some(value) = override_cfg.report_log_path {
                config.report_log_path = value;
            }
            if let Some(value) = override_cfg.report_log_name {
                config.report_log_name = value;
            }
            if let Some(value) = override_cfg.identity_url {
                config.identity_url = value;
            }
        }
        Ok(config)
    }
}
