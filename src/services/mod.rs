/// Random garage generation.
pub mod garage_service;
/// Per-car animation and engine control.
pub mod motion;
/// Race orchestration, settlement and reset.
pub mod race_service;
/// Snapshot persistence coordinator with debouncing.
pub mod storage_supervisor;
