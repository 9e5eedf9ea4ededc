//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) una sola vez y expone `AppConfig`, de
//! donde salen los binarios externos, la política de aceptación de
//! resultados previos y la bitácora de sesión.
use std::env;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use sim_core::constants::{DEFAULT_REDUCER_TOOL, DEFAULT_SOLVER_TOOL};
use sim_core::{JobSettings, LeniencyPolicy};
use sim_domain::Model;

use crate::errors::AppError;

/// `.env` se lee una vez por proceso, antes del primer `from_env`.
static DOTENV_LOADED: Lazy<bool> = Lazy::new(|| dotenvy::dotenv().is_ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Binario del reductor (`SIMFLOW_REDUCER_BIN`).
    pub reducer_bin: String,
    /// Binario del solver dinámico (`SIMFLOW_SOLVER_BIN`).
    pub solver_bin: String,
    /// Aceptar resultados sin checksum verificable.
    pub accept_unverified: bool,
    /// Aceptar sidecars de formato antiguo aunque no coincidan.
    pub accept_legacy: bool,
    /// Pisa el límite de procesos del modelo.
    pub max_processes: Option<usize>,
    /// Archivo JSON lines para la bitácora de sesión.
    pub event_log: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { reducer_bin: DEFAULT_REDUCER_TOOL.to_string(),
               solver_bin: DEFAULT_SOLVER_TOOL.to_string(),
               accept_unverified: true,
               accept_legacy: true,
               max_processes: None,
               event_log: None }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::Config(format!("{name}: valor booleano inválido '{other}'"))),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut cfg = Self::default();
        if let Some(v) = lookup("SIMFLOW_REDUCER_BIN").filter(|v| !v.trim().is_empty()) {
            cfg.reducer_bin = v;
        }
        if let Some(v) = lookup("SIMFLOW_SOLVER_BIN").filter(|v| !v.trim().is_empty()) {
            cfg.solver_bin = v;
        }
        if let Some(v) = lookup("SIMFLOW_ACCEPT_UNVERIFIED") {
            cfg.accept_unverified = parse_bool("SIMFLOW_ACCEPT_UNVERIFIED", &v)?;
        }
        if let Some(v) = lookup("SIMFLOW_ACCEPT_LEGACY") {
            cfg.accept_legacy = parse_bool("SIMFLOW_ACCEPT_LEGACY", &v)?;
        }
        if let Some(v) = lookup("SIMFLOW_MAX_PROCESSES") {
            let n: usize = v.trim()
                            .parse()
                            .map_err(|_| AppError::Config(format!("SIMFLOW_MAX_PROCESSES: número inválido '{v}'")))?;
            if n == 0 {
                return Err(AppError::Config("SIMFLOW_MAX_PROCESSES debe ser al menos 1".into()));
            }
            cfg.max_processes = Some(n);
        }
        cfg.event_log = lookup("SIMFLOW_EVENT_LOG").filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        Ok(cfg)
    }

    pub fn leniency(&self) -> LeniencyPolicy {
        LeniencyPolicy { accept_unverified: self.accept_unverified,
                         accept_legacy: self.accept_legacy }
    }

    /// Ajustes de trabajo para `model`: el entorno manda sobre el modelo.
    pub fn job_settings(&self, model: &Model, batch: bool) -> JobSettings {
        let from_model = Some(model.analysis.max_concurrent_processes).filter(|n| *n > 0);
        JobSettings { reducer_tool: self.reducer_bin.clone(),
                      solver_tool: self.solver_bin.clone(),
                      batch,
                      max_concurrent: self.max_processes.or(from_model).unwrap_or(1),
                      ..JobSettings::default() }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_vars() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.leniency(), LeniencyPolicy::default());
    }

    #[test]
    fn reads_all_vars() {
        let cfg = AppConfig::from_lookup(lookup(&[("SIMFLOW_REDUCER_BIN", "/opt/bin/red"),
                                                  ("SIMFLOW_ACCEPT_LEGACY", "no"),
                                                  ("SIMFLOW_MAX_PROCESSES", "4"),
                                                  ("SIMFLOW_EVENT_LOG", "log/s.jsonl")])).unwrap();
        assert_eq!(cfg.reducer_bin, "/opt/bin/red");
        assert_eq!(cfg.solver_bin, DEFAULT_SOLVER_TOOL);
        assert!(cfg.accept_unverified);
        assert!(!cfg.accept_legacy);
        assert_eq!(cfg.max_processes, Some(4));
        assert_eq!(cfg.event_log, Some(PathBuf::from("log/s.jsonl")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(AppConfig::from_lookup(lookup(&[("SIMFLOW_ACCEPT_UNVERIFIED", "quizás")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("SIMFLOW_MAX_PROCESSES", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("SIMFLOW_MAX_PROCESSES", "x")])).is_err());
    }

    #[test]
    fn process_limit_prefers_env_then_model() {
        let mut model = Model::new("m", "/w");
        let cfg = AppConfig::default();
        assert_eq!(cfg.job_settings(&model, false).max_concurrent, 1);
        model.analysis.max_concurrent_processes = 3;
        assert_eq!(cfg.job_settings(&model, true).max_concurrent, 3);
        let cfg = AppConfig { max_processes: Some(8),
                              ..AppConfig::default() };
        let settings = cfg.job_settings(&model, true);
        assert_eq!(settings.max_concurrent, 8);
        assert!(settings.batch);
    }
}
