//! Client side of the race mock API: garage, engine and winners endpoints.

mod client;
mod error;
pub mod models;
pub mod validation;

use futures::future::BoxFuture;

pub use client::RestClient;
pub use error::{ApiError, ApiResult};
pub use models::{Car, CarId, CarInput, DriveOutcome, EngineStatus, Winner, WinnerUpdate};

/// Engine endpoints for a single car.
///
/// Calls are independent; callers must make sure a car's engine is started
/// before asking it to drive.
pub trait EngineApi: Send + Sync {
    /// Start the engine and return its speed parameters.
    fn start_engine(&self, id: CarId) -> BoxFuture<'static, ApiResult<EngineStatus>>;
    /// Stop the engine.
    fn stop_engine(&self, id: CarId) -> BoxFuture<'static, ApiResult<EngineStatus>>;
    /// Switch to drive mode; resolves once the car finished or broke down.
    fn drive(&self, id: CarId) -> BoxFuture<'static, ApiResult<DriveOutcome>>;
}

/// Garage CRUD endpoints.
pub trait GarageApi: Send + Sync {
    /// Fetch one page of cars.
    fn list_cars(&self, page: u32, limit: u32) -> BoxFuture<'static, ApiResult<Vec<Car>>>;
    /// Count every car in the garage.
    fn count_cars(&self) -> BoxFuture<'static, ApiResult<usize>>;
    /// Create a car.
    fn create_car(&self, input: CarInput) -> BoxFuture<'static, ApiResult<Car>>;
    /// Replace a car's name and color.
    fn update_car(&self, id: CarId, input: CarInput) -> BoxFuture<'static, ApiResult<Car>>;
    /// Delete a car.
    fn delete_car(&self, id: CarId) -> BoxFuture<'static, ApiResult<()>>;
}

/// Winners (leaderboard) endpoints.
pub trait WinnersApi: Send + Sync {
    /// Fetch one page of winners.
    fn list_winners(&self, page: u32, limit: u32) -> BoxFuture<'static, ApiResult<Vec<Winner>>>;
    /// Count every winner record.
    fn count_winners(&self) -> BoxFuture<'static, ApiResult<usize>>;
    /// Look up the record of one car, `None` when it never won.
    fn find_winner(&self, id: CarId) -> BoxFuture<'static, ApiResult<Option<Winner>>>;
    /// Create a winner record.
    fn create_winner(&self, winner: Winner) -> BoxFuture<'static, ApiResult<Winner>>;
    /// Overwrite the win count and best time of a record.
    fn update_winner(
        &self,
        id: CarId,
        update: WinnerUpdate,
    ) -> BoxFuture<'static, ApiResult<Winner>>;
    /// Delete a winner record.
    fn delete_winner(&self, id: CarId) -> BoxFuture<'static, ApiResult<()>>;
}
