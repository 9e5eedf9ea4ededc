//! Acumulador de checksum sobre una secuencia ordenada de campos.
//!
//! El orden de `add_*` es parte del contrato: el productor (al crear la
//! entrada del reductor) y el validador deben acumular exactamente los mismos
//! campos en el mismo orden.
use blake3::Hasher;
use sim_domain::{AnalysisOptions, Part};

pub type Checksum = u64;

pub struct ChecksumAccumulator {
    hasher: Hasher,
}

impl Default for ChecksumAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChecksumAccumulator {
    pub fn new() -> Self {
        Self { hasher: Hasher::new() }
    }

    pub fn add_u64(&mut self, v: u64) -> &mut Self {
        self.feed(b'u', &v.to_le_bytes())
    }

    pub fn add_i32(&mut self, v: i32) -> &mut Self {
        self.feed(b'i', &v.to_le_bytes())
    }

    /// Se acumula el patrón de bits, así `-0.0 != 0.0`.
    pub fn add_f64(&mut self, v: f64) -> &mut Self {
        self.feed(b'f', &v.to_bits().to_le_bytes())
    }

    pub fn add_bool(&mut self, v: bool) -> &mut Self {
        self.feed(b'b', &[v as u8])
    }

    pub fn add_str(&mut self, s: &str) -> &mut Self {
        self.add_u64(s.len() as u64);
        self.feed(b's', s.as_bytes())
    }

    fn feed(&mut self, tag: u8, bytes: &[u8]) -> &mut Self {
        self.hasher.update(&[tag]);
        self.hasher.update(bytes);
        self
    }

    /// Valor actual. Nunca 0 (reservado para "desconocido").
    pub fn current(&self) -> Checksum {
        let hash = self.hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head).max(1)
    }
}

/// Checksum esperado para la reducción de `part`. `None` si los datos FE de
/// la parte no se han cargado en esta sesión.
pub fn reduction_checksum(part: &Part, analysis: &AnalysisOptions) -> Option<Checksum> {
    let definition = part.definition_checksum?;
    let opts = &part.reduction;
    let mut acc = ChecksumAccumulator::new();
    acc.add_u64(definition)
       .add_i32(opts.n_gen_modes.max(0))
       .add_i32(opts.eigenvalues_to_compute())
       .add_i32(analysis.equation_solver.code())
       .add_f64(opts.tol_eigenval)
       .add_f64(opts.tol_factorize);
    // solo las opciones no por defecto alteran el checksum
    if !opts.consistent_mass {
        acc.add_i32(2);
    }
    if !opts.factorize_mass_in_eigensolver && opts.n_gen_modes > 0 {
        acc.add_i32(1);
    }
    Some(acc.current())
}
