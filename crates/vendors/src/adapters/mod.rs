//! Per-vendor adapter implementations.

pub mod berkeley;
pub mod chicago;
pub mod civicclerk;
pub mod civicengage;
pub mod civicplus;
pub mod escribe;
pub mod granicus;
pub mod iqm2;
pub mod legistar;
pub mod menlopark;
pub mod municode;
pub mod novusagenda;
pub mod onbase;
pub mod primegov;
