//! Reducción de una parte estructural (trabajo hoja).
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use rayon::prelude::*;
use sim_domain::{LockLevel, MatrixKind, Model, Part, PartId, ReductionPurpose, Requirement, ResultFileSet};

use super::{CompletionStatus, DependencyOutcome, Environment, ExecuteOutcome, JobCompletion, JobGroup, JobSignature};
use crate::checksum::{ChecksumSidecar, ChecksumValidator, DirVerdict, ValidateFileSet};
use crate::constants::{NUM_STATES_SUFFIX, TERMINAL_DISCARD, TERMINAL_FILE_UNIT};
use crate::errors::OrchestrationError;
use crate::event::SessionEventKind;
use crate::hashing::{reduction_checksum, Checksum};
use crate::input::ReducerInput;
use crate::process::{ProcessExit, ProcessOptions, ProcessRequest};

#[derive(Debug)]
pub struct ReductionJob {
    part: PartId,
    purpose: ReductionPurpose,
    signature: JobSignature,
    wanted: Option<Checksum>,
    work_dir: Option<PathBuf>,
    prev_lock: LockLevel,
}

impl ReductionJob {
    pub fn new(part: PartId, purpose: ReductionPurpose, env: &mut Environment<'_>) -> Result<Self, OrchestrationError> {
        let p = env.model.part(part).ok_or(OrchestrationError::UnknownPart(part))?;
        let task = match &p.result_files.task_dir {
            Some(dir) => dir.clone(),
            None => {
                let base = p.base_name().unwrap_or_else(|| p.name.clone());
                format!("{base}_attempt{}", env.session.next_attempt())
            }
        };
        let location = env.model.part_repository(p).join(task);
        Ok(Self { part,
                  purpose,
                  signature: JobSignature::new(env.settings.reducer_name(), location.display()),
                  wanted: None,
                  work_dir: None,
                  prev_lock: p.lock_level })
    }

    pub fn signature(&self) -> &JobSignature {
        &self.signature
    }

    pub fn part(&self) -> PartId {
        self.part
    }

    pub fn purpose(&self) -> ReductionPurpose {
        self.purpose
    }

    /// Directorio creado por `create_input`, si ya se llamó.
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    pub fn check_dependencies(&mut self, env: &mut Environment<'_>) -> DependencyOutcome {
        let batch = env.settings.batch;
        let validator = env.validator;
        let Some(part) = env.model.part(self.part) else {
            error!("part {} no longer exists", self.part);
            return DependencyOutcome::NotExecutable;
        };
        if part.skips_reduction() {
            return DependencyOutcome::ResultsOk;
        }
        if let Some(ext) = &part.external_matrices {
            if self.purpose == ReductionPurpose::Recovery {
                error!("{}: externally supplied matrices cannot be used for recovery", part.id_string());
                return DependencyOutcome::NotExecutable;
            }
            if ext.all_exist(&env.model.root) {
                return DependencyOutcome::ResultsOk;
            }
            error!("{}: externally supplied matrix files are missing", part.id_string());
            return DependencyOutcome::NotExecutable;
        }
        if part.lock_level == LockLevel::DenyLinkUsage {
            warn!("{}: usage of the FE data is locked", part.id_string());
            return DependencyOutcome::NotExecutable;
        }
        if env.session.has_failed(self.part) {
            debug!("{}: failed earlier in this session, not retried", part.id_string());
            return DependencyOutcome::NotExecutable;
        }
        let Some(base) = part.base_name() else {
            error!("{}: no FE data file", part.id_string());
            return DependencyOutcome::NotExecutable;
        };

        let reqs = ResultFileSet::required_files(part, &env.model.analysis, self.purpose);
        let repo = env.model.part_repository(part);
        self.wanted = reduction_checksum(part, &env.model.analysis);

        if part.override_checksum {
            let verdict = part.result_files
                              .task_dir
                              .as_ref()
                              .map(|dir| validator.check_existence(&repo.join(dir), &base, &reqs));
            return match verdict {
                Some(v) if v.accepted(false) => {
                    warn!("{}: checksum test ignored, existing reduced matrices are used", part.id_string());
                    DependencyOutcome::ResultsOk
                }
                _ => {
                    error!("{}: checksum test is ignored but reduced matrix files are missing", part.id_string());
                    DependencyOutcome::NotExecutable
                }
            };
        }

        if let Some(verdict) = part.result_files.validate(&repo, &base, &reqs, &validator, self.wanted) {
            if verdict.accepted(false) {
                report_leniency(part, &verdict);
                return DependencyOutcome::ResultsOk;
            }
        }
        if self.wanted.is_none() {
            return DependencyOutcome::ReadyToRun;
        }

        let Some((task_dir, verdict)) = scan_candidates(&repo, &base, &reqs, &validator, self.wanted, batch) else {
            return DependencyOutcome::ReadyToRun;
        };
        report_leniency(part, &verdict);
        debug!("{}: reusing reduced matrices in {task_dir}", part.id_string());
        if let Some(part) = env.model.part_mut(self.part) {
            part.result_files.remap_to(task_dir.clone(), &base, verdict.kept(batch));
            part.needs_save = true;
        }
        env.session.record(SessionEventKind::CacheHit { part: self.part.0,
                                                        task_dir });
        DependencyOutcome::ResultsOk
    }

    /// Si hay que reducir, prepara `<base>_<n+1>` con la entrada del reductor.
    pub fn create_input(&mut self, env: &mut Environment<'_>) -> DependencyOutcome {
        let outcome = self.check_dependencies(env);
        if outcome != DependencyOutcome::ReadyToRun {
            return outcome;
        }
        let Some(part) = env.model.part(self.part) else {
            return DependencyOutcome::NotExecutable;
        };
        let Some(base) = part.base_name() else {
            return DependencyOutcome::NotExecutable;
        };
        let repo = env.model.part_repository(part);
        let next = candidate_dirs(&repo, &base).last().map_or(1, |(n, _)| n + 1);
        let task_dir = format!("{base}_{next}");
        let work_dir = repo.join(&task_dir);
        if let Err(e) = fs::create_dir_all(&work_dir) {
            error!("{}: cannot create {}: {e}", part.id_string(), work_dir.display());
            return DependencyOutcome::NotExecutable;
        }

        let input = ReducerInput { tool: env.settings.reducer_name(),
                                   work_dir: &work_dir,
                                   part,
                                   base_name: &base,
                                   fe_path: part.fe_file.as_ref().map(|f| env.model.root.join(f)).unwrap_or_default(),
                                   checksum: self.wanted,
                                   equation_solver: env.model.analysis.equation_solver.code(),
                                   add_opts: &env.model.analysis.reducer_add_opts };
        if let Err(e) = env.inputs.write_reducer_input(&input) {
            error!("{}: reducer input not written: {e}", part.id_string());
            return DependencyOutcome::NotExecutable;
        }

        let kinds = used_kinds(&ResultFileSet::required_files(part, &env.model.analysis, self.purpose));
        if let Some(part) = env.model.part_mut(self.part) {
            part.result_files.remap_to(task_dir, &base, kinds);
            part.needs_save = true;
        }
        self.work_dir = Some(work_dir);
        DependencyOutcome::ReadyToRun
    }

    pub fn execute(&mut self, env: &mut Environment<'_>) -> ExecuteOutcome {
        let outcome = self.create_input(env);
        if outcome != DependencyOutcome::ReadyToRun {
            if outcome == DependencyOutcome::NotExecutable {
                env.session.mark_failed(self.part);
            }
            return ExecuteOutcome::NotStarted(outcome);
        }
        let Some(work_dir) = self.work_dir.clone() else {
            return ExecuteOutcome::NotStarted(DependencyOutcome::NotExecutable);
        };
        let settings = env.settings;
        let tool = settings.reducer_name();
        if settings.batch {
            info!("===> Input files for batch execution of {tool} created in:\n     {}", work_dir.display());
            return ExecuteOutcome::Prepared;
        }

        let add_opts = &env.model.analysis.reducer_add_opts;
        let mut opts = ProcessOptions::new();
        opts.add("fco", format!("{tool}.fco")).add("fop", format!("{tool}.fop"));
        if !add_opts.is_empty() {
            opts.add("fao", format!("{tool}.fao"));
        }
        opts.flag("consolemsg");
        if !settings.console {
            opts.add("terminal", TERMINAL_FILE_UNIT);
        } else if settings.max_concurrent > 1 && !add_opts.contains("-terminal") {
            opts.add("terminal", TERMINAL_DISCARD);
        }

        let Some(part) = env.model.part_mut(self.part) else {
            return ExecuteOutcome::NotStarted(DependencyOutcome::NotExecutable);
        };
        let id = part.id_string();
        self.prev_lock = part.lock_level;
        part.lock_level = LockLevel::DenyAllLinkMod;
        env.session.record(SessionEventKind::PartLockChanged { part: self.part.0,
                                                               locked: true });

        info!("===> Reducing: {id} ...\n  -> Results in {}", work_dir.display());
        let request = ProcessRequest { signature: self.signature.clone(),
                                       program: settings.reducer_tool.clone(),
                                       args: opts.into_args(),
                                       working_dir: work_dir };
        if let Err(e) = env.launcher.launch(request) {
            error!("===> {tool} could not be started for {id}: {e}");
            self.restore_lock(env);
            env.session.mark_failed(self.part);
            return ExecuteOutcome::NotStarted(DependencyOutcome::NotExecutable);
        }
        ExecuteOutcome::Started
    }

    /// Fin del proceso: el código de salida no basta, se re-validan los
    /// archivos producidos contra el checksum esperado.
    pub fn on_actual_process_death(&mut self, exit: ProcessExit, env: &mut Environment<'_>) -> JobCompletion {
        self.restore_lock(env);
        let tool = env.settings.reducer_name();
        let (id, override_checksum) = env.model
                                         .part(self.part)
                                         .map(|p| (p.id_string(), p.override_checksum))
                                         .unwrap_or_else(|| (format!("Part {}", self.part), false));

        let mut status = match exit {
            ProcessExit::Killed => CompletionStatus::Killed,
            ProcessExit::Code(0) => CompletionStatus::Succeeded,
            ProcessExit::Code(_) => CompletionStatus::Failed,
        };
        let mut diagnostic = None;
        if status == CompletionStatus::Succeeded && !override_checksum {
            match self.verify_output(env.model, env.validator) {
                Ok(verdict) => self.adopt_output(env.model, &verdict),
                Err(msg) => {
                    status = CompletionStatus::Failed;
                    diagnostic = Some(msg);
                }
            }
        }

        match status {
            CompletionStatus::Succeeded => info!("===> {tool} done for {id}"),
            CompletionStatus::Killed => warn!("===> {tool} terminated by user for {id}"),
            _ => {
                if let ProcessExit::Code(code) = exit {
                    error!("===> {tool} failed for {id} (exit code {code})");
                }
                if let Some(msg) = &diagnostic {
                    error!("     {msg}");
                }
                if let Some(dir) = &self.work_dir {
                    error!("     See {} for details", dir.join(format!("{tool}.res")).display());
                }
            }
        }
        if status != CompletionStatus::Succeeded {
            env.session.mark_failed(self.part);
        }
        JobCompletion { signature: self.signature.clone(),
                        group: JobGroup::Reducer,
                        status,
                        diagnostic }
    }

    /// True si la parte tiene matrices reducidas utilizables. Hace el mismo
    /// chequeo que `check_dependencies` (incluido el escaneo de `<base>_<n>`
    /// y su remapeo). Las partes que no se reducen devuelven false.
    pub fn is_reduced(&mut self, env: &mut Environment<'_>) -> bool {
        match env.model.part(self.part) {
            Some(part) if !part.skips_reduction() => self.check_dependencies(env) == DependencyOutcome::ResultsOk,
            _ => false,
        }
    }

    fn restore_lock(&self, env: &mut Environment<'_>) {
        if let Some(part) = env.model.part_mut(self.part) {
            part.lock_level = self.prev_lock;
        }
        env.session.record(SessionEventKind::PartLockChanged { part: self.part.0,
                                                               locked: false });
    }

    fn verify_output(&self, model: &mut Model, validator: ChecksumValidator) -> Result<DirVerdict, String> {
        let (Some(part), Some(dir)) = (model.part(self.part), self.work_dir.as_deref()) else {
            return Err("no reduction directory".to_string());
        };
        let base = part.base_name().unwrap_or_default();
        let reqs = ResultFileSet::required_files(part, &model.analysis, ReductionPurpose::FullOutput);

        if let Some(wanted) = self.wanted {
            // el reductor puede no escribir sidecar: se sella con el checksum
            // con el que se preparó la entrada
            let path = ChecksumSidecar::path_for(dir, &base);
            if !path.exists() {
                if let Err(e) = ChecksumSidecar::current(wanted).write(&path) {
                    warn!("{e}");
                }
            }
        }

        let verdict = validator.validate_in_dir(dir, &base, &reqs, self.wanted);
        let names = |kinds: &[MatrixKind]| kinds.iter().map(|k| k.file_name(&base)).collect::<Vec<_>>().join(", ");
        if !verdict.missing.is_empty() {
            return Err(format!("Missing reduced matrix files in {}: {}. A re-reduction is needed.",
                               dir.display(),
                               names(&verdict.missing)));
        }
        if !verdict.invalid.is_empty() {
            let msg = format!("Checksum mismatch in {}: {}. Save the model and reopen it before solving again.",
                              dir.display(),
                              names(&verdict.invalid));
            if let Some(part) = model.part_mut(self.part) {
                part.needs_save = true;
            }
            return Err(msg);
        }
        Ok(verdict)
    }

    fn adopt_output(&self, model: &mut Model, verdict: &DirVerdict) {
        let Some(part) = model.part(self.part) else {
            return;
        };
        let (Some(base), Some(dir)) = (part.base_name(), self.work_dir.as_deref()) else {
            return;
        };
        let kinds: Vec<_> = used_kinds(&ResultFileSet::required_files(part, &model.analysis, self.purpose))
            .into_iter()
            .filter(|k| verdict.files.get(k).is_some_and(|v| v.is_valid()))
            .collect();
        let states = part.reduction
                         .nonlinear_reduction
                         .then(|| read_num_states(dir, &base).unwrap_or(part.reduction.nonlinear_solutions));
        let task_dir = dir.file_name().and_then(|n| n.to_str()).map(str::to_string);

        if let Some(part) = model.part_mut(self.part) {
            if let Some(task_dir) = task_dir {
                part.result_files.remap_to(task_dir, &base, kinds);
            }
            if let Some(n) = states {
                part.nonlinear_states = n;
            }
            part.needs_save = true;
        }
    }
}

fn used_kinds(reqs: &BTreeMap<MatrixKind, Requirement>) -> Vec<MatrixKind> {
    reqs.iter().filter(|(_, r)| **r != Requirement::Unused).map(|(k, _)| *k).collect()
}

fn report_leniency(part: &Part, verdict: &DirVerdict) {
    if verdict.has_unverified() {
        warn!("{}: reduced matrices accepted without checksum verification", part.id_string());
    }
    if verdict.has_legacy() {
        warn!("{}: reduced matrices have an older checksum format; consider reducing again", part.id_string());
    }
}

/// Subdirectorios `<base>_<n>` ordenados por `n` ascendente.
fn candidate_dirs(repo: &Path, base: &str) -> Vec<(u32, String)> {
    let Ok(entries) = fs::read_dir(repo) else {
        return Vec::new();
    };
    let prefix = format!("{base}_");
    let mut dirs: Vec<(u32, String)> = entries.filter_map(Result::ok)
                                              .filter(|e| e.path().is_dir())
                                              .filter_map(|e| {
                                                  let name = e.file_name().into_string().ok()?;
                                                  let n = name.strip_prefix(&prefix)?.parse::<u32>().ok()?;
                                                  Some((n, name))
                                              })
                                              .collect();
    dirs.sort();
    dirs
}

/// Primer candidato aceptable en orden de `n`; la validación va en paralelo.
fn scan_candidates(repo: &Path,
                   base: &str,
                   reqs: &BTreeMap<MatrixKind, Requirement>,
                   validator: &ChecksumValidator,
                   wanted: Option<Checksum>,
                   tolerate_missing: bool)
                   -> Option<(String, DirVerdict)> {
    candidate_dirs(repo, base).into_par_iter()
                              .map(|(_, name)| {
                                  let verdict = validator.validate_in_dir(&repo.join(&name), base, reqs, wanted);
                                  (name, verdict)
                              })
                              .find_first(|(_, v)| v.accepted(tolerate_missing))
}

fn read_num_states(dir: &Path, base: &str) -> Option<u32> {
    let path = dir.join(format!("{base}{NUM_STATES_SUFFIX}"));
    match fs::read_to_string(&path) {
        Ok(text) => text.trim().parse().ok(),
        Err(e) => {
            warn!("cannot read {}: {e}", path.display());
            None
        }
    }
}
