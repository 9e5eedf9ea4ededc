//! Archivos de opciones para reductor y solver.
//!
//! Formato: una opción `-nombre valor` por línea, igual que en la línea de
//! comandos. El core pasa `-fco/-fop/-fao` apuntando a estos archivos.
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::debug;
use sim_core::{InputError, InputGenerator, ReducerInput, SolverInput};
use sim_domain::{MatrixKind, Model};

#[derive(Debug, Clone, Default)]
pub struct FileInputGenerator;

impl FileInputGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Nombre del archivo de entrada del solver dentro del task dir.
    pub fn solver_input_name(model: &Model) -> String {
        format!("{}.fsi", model.name)
    }
}

fn write_file(path: PathBuf, contents: &str) -> Result<(), InputError> {
    debug!("writing {}", path.display());
    fs::write(&path, contents).map_err(|source| InputError::Io { path, source })
}

fn option_files(tool: &str, work_dir: &Path, fco: &str, fop: &str, add_opts: &str) -> Result<(), InputError> {
    write_file(work_dir.join(format!("{tool}.fco")), fco)?;
    write_file(work_dir.join(format!("{tool}.fop")), fop)?;
    if !add_opts.trim().is_empty() {
        write_file(work_dir.join(format!("{tool}.fao")), &format!("{}\n", add_opts.trim()))?;
    }
    Ok(())
}

impl InputGenerator for FileInputGenerator {
    fn write_reducer_input(&self, input: &ReducerInput<'_>) -> Result<(), InputError> {
        if input.base_name.is_empty() {
            return Err(InputError::Invalid(format!("{} has no FE data file", input.part.id_string())));
        }
        let part = input.part;
        let red = &part.reduction;
        let base = input.base_name;

        let mut fco = String::new();
        let _ = writeln!(fco, "-linkId {}", part.id.0);
        let _ = writeln!(fco, "-linkfile \"{}\"", input.fe_path.display());
        for (opt, kind) in [("samfile", MatrixKind::SamData),
                            ("stiffile", MatrixKind::Stiffness),
                            ("massfile", MatrixKind::Mass),
                            ("gravfile", MatrixKind::Gravity),
                            ("Bmatfile", MatrixKind::Recovery),
                            ("eigfile", MatrixKind::GeneralizedModes),
                            ("dispfile", MatrixKind::Displacement)]
        {
            let _ = writeln!(fco, "-{opt} {}", kind.file_name(base));
        }
        if part.has_loads {
            let _ = writeln!(fco, "-loadfile {}", MatrixKind::Load.file_name(base));
        }
        let _ = writeln!(fco, "-neval {}", red.eigenvalues_to_compute());
        let _ = writeln!(fco, "-ngen {}", red.n_gen_modes);
        let _ = writeln!(fco, "-tolEigval {:e}", red.tol_eigenval);
        let _ = writeln!(fco, "-tolFactorize {:e}", red.tol_factorize);
        if !red.consistent_mass {
            let _ = writeln!(fco, "-lumpedmass");
        }
        if !red.factorize_mass_in_eigensolver {
            let _ = writeln!(fco, "-factorMass-");
        }
        if red.nonlinear_reduction {
            let _ = writeln!(fco, "-fmxfile {}", MatrixKind::NonlinearForce.file_name(base));
            let _ = writeln!(fco, "-nonlinear_solutions {}", red.nonlinear_solutions);
        }
        let _ = writeln!(fco, "-eqsolver {}", input.equation_solver);
        if let Some(cs) = input.checksum {
            let _ = writeln!(fco, "-checksum {cs:016x}");
        }

        let fop = format!("-resfile {}.res\n-linkName \"{}\"\n", input.tool, part.name);
        option_files(input.tool, input.work_dir, &fco, &fop, input.add_opts)
    }

    fn write_solver_input(&self, input: &SolverInput<'_>) -> Result<(), InputError> {
        let model = input.model;
        let fsi = Self::solver_input_name(model);

        let mut fco = String::new();
        let _ = writeln!(fco, "-fsifile {fsi}");
        let _ = writeln!(fco, "-rdbinc 1");
        let _ = writeln!(fco, "-resfile {}.res", input.tool);
        if !input.plugins.is_empty() {
            let list: Vec<String> = input.plugins.iter().map(|p| p.display().to_string()).collect();
            let _ = writeln!(fco, "-plugin \"{}\"", list.join(","));
        }
        let fop = "-frs1file th_p_1.frs\n-frs2file th_s_1.frs\n";
        option_files(input.tool, input.work_dir, &fco, fop, input.add_opts)?;

        // descripción del modelo: una línea por parte con su directorio reducido
        let a = &model.analysis;
        let mut text = String::new();
        let _ = writeln!(text, "MODEL \"{}\"", model.name);
        match input.event {
            Some(ev) => {
                let _ = writeln!(text, "EVENT {}", ev.0);
            }
            None => {
                let _ = writeln!(text, "EVENT none");
            }
        }
        let _ = writeln!(text, "GRAVITY {} {} {}", a.gravity[0], a.gravity[1], a.gravity[2]);
        let _ = writeln!(text, "QUASISTATIC {}", a.quasistatic_only);
        let _ = writeln!(text, "EIGENSOLVE {}", a.eigenvalue_solve);
        for part in model.parts.iter().filter(|p| !p.suppress_in_solver) {
            let dir = match &part.result_files.task_dir {
                Some(task) => model.part_repository(part).join(task),
                None => match &part.external_matrices {
                    Some(ext) => model.root.join(ext.stiffness.parent().unwrap_or(Path::new(""))),
                    None => PathBuf::new(),
                },
            };
            let _ = writeln!(text, "PART {} \"{}\" \"{}\"", part.id.0, part.name, dir.display());
        }
        write_file(input.work_dir.join(fsi), &text)
    }

    fn export_baseline_vtf(&self, model: &Model, target: &Path) -> Result<(), InputError> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| InputError::Io { path: parent.to_path_buf(),
                                                                         source })?;
        }
        let mut text = String::from("*VTF-1.00\n");
        let _ = writeln!(text, "!model: {}", model.name);
        let _ = writeln!(text, "!exported: {}", Utc::now().to_rfc3339());
        for part in &model.parts {
            let _ = writeln!(text, "*PART {}\n%NAME \"{}\"", part.id.0, part.name);
        }
        write_file(target.to_path_buf(), &text)
    }
}
