pub mod client;     // FroniusClient and poll cycle
pub mod commands;   // validated register writes
pub mod control;    // extended storage control modes
pub mod profile;    // identity and nameplate reads
pub mod reader;     // periodic telemetry reads
pub mod registers;  // register map and lookup tables
pub mod solar_api;  // HTTP side channel for storage identity
pub mod telemetry;  // typed current-value store
