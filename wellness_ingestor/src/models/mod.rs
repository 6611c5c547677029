pub mod spo2;
pub mod wellness;
