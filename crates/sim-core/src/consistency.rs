//! Verificación estática del modelo antes de resolver.
use sim_domain::Model;

pub trait ConsistencyCheck {
    /// `Err` con la lista de problemas encontrados.
    fn check_consistency(&self) -> Result<(), Vec<String>>;
}

impl ConsistencyCheck for Model {
    fn check_consistency(&self) -> Result<(), Vec<String>> {
        self.pre_solve_check()
    }
}
