use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "simflow - reducción de partes y solver dinámico con caché por checksum")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Más detalle (-v DEBUG, -vv TRACE). `SIMFLOW_LOG` tiene prioridad.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Solo errores
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reduce lo necesario y corre el solver dinámico.
    Solve(SolveArgs),
    /// Verificación previa del modelo, sin lanzar procesos.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
pub struct SolveArgs {
    /// Modelo JSON
    #[arg(value_name = "MODEL")]
    pub model: PathBuf,

    /// Id del evento a resolver (por defecto el modelo maestro)
    #[arg(short, long, value_name = "ID")]
    pub event: Option<u32>,

    /// Solo generar entradas para ejecución offline
    #[arg(long)]
    pub batch: bool,

    /// Reducir todas las partes para recuperación de resultados
    #[arg(long, conflicts_with = "event")]
    pub recovery: bool,

    /// Límite de procesos simultáneos
    #[arg(short = 'j', long, value_name = "NUM")]
    pub max_processes: Option<usize>,

    /// Rechazar resultados sin checksum o con sidecar antiguo
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(value_name = "MODEL")]
    pub model: PathBuf,
}
