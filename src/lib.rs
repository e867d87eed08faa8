pub mod geodesy;
pub mod constants;
pub mod clock;
pub mod error;
pub mod track;
pub mod session;
pub mod route;
pub mod monitor;
pub mod reroute;
pub mod source;
pub mod gateway;
pub mod net;
pub mod observer;
pub mod engine;
pub mod output;
pub mod config;
