pub mod align;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod indicators;
pub mod logging;
pub mod network;
pub mod pipeline;
pub mod regime;
pub mod series;
pub mod source;
pub mod volatility;
