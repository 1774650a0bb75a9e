pub mod aggregate;
pub mod expected_gain;
