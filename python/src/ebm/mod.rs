pub mod python_bridge;

pub use python_bridge::{explanation_from_ebm_global, EbmFitter};
