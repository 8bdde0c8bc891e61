// src/lib.rs
pub mod data {
    pub mod setup;
    pub mod extraction;
    pub mod grid;
    pub mod calibration;
    pub mod peak_selection;
    pub mod evaluation;
}

pub mod controller {
    pub mod calibration;
    pub mod evaluation;
}

pub mod error;
pub mod progress;
pub mod session;
