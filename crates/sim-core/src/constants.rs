//! Constantes del core.
//!
//! `SIDECAR_REVISION` forma parte del contrato en disco: un sidecar con una
//! revisión anterior no se puede comparar y cae en la ruta "legacy".

/// Revisión actual del formato del sidecar `<base>.chk`.
pub const SIDECAR_REVISION: u32 = 2;

pub const SIDECAR_EXTENSION: &str = "chk";

/// Archivo con el número de estados de una reducción no lineal.
pub const NUM_STATES_SUFFIX: &str = "_numStates.txt";

pub const DEFAULT_REDUCER_TOOL: &str = "fedem_reducer";
pub const DEFAULT_SOLVER_TOOL: &str = "fedem_solver";

/// Unidad Fortran para la salida de terminal en modo no consola.
pub const TERMINAL_FILE_UNIT: i32 = 7;
/// Redirección de la salida de terminal a /dev/null.
pub const TERMINAL_DISCARD: i32 = -1;
