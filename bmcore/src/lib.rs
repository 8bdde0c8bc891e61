// data module
pub mod data {
    pub mod spectrum;
    pub mod region;
}

// algorithm module
pub mod algorithm {
    pub mod peaks;
    pub mod regions;
    pub mod lorentz;
    pub mod vipa;
    pub mod bounds;
}

// simulation module
pub mod simulation {
    pub mod spectrum;
}

pub mod error;
