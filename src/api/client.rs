use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::{
    EngineApi, GarageApi, WinnersApi,
    error::{ApiError, ApiResult},
    models::{
        Car, CarId, CarInput, DriveOutcome, EngineCommand, EngineStatus, Winner, WinnerUpdate,
    },
};

const GARAGE: &str = "garage";
const WINNERS: &str = "winners";
const ENGINE: &str = "engine";

/// `reqwest`-backed implementation of every race API trait.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: Arc<str>,
}

impl RestClient {
    /// Build a client for the API served at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::<str>::from(base_url.trim_end_matches('/')),
        })
    }

    /// Base URL every request path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        self.client.request(method, url)
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> ApiResult<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|source| ApiError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ApiError::Status {
                path: path.to_string(),
                status: response.status(),
            })
        }
    }

    async fn send_json<T>(&self, builder: RequestBuilder, path: &str) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(builder, path).await?;
        response
            .json::<T>()
            .await
            .map_err(|source| ApiError::Decode {
                path: path.to_string(),
                source,
            })
    }

    async fn get_page<T>(&self, collection: &str, page: u32, limit: u32) -> ApiResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let builder = self
            .request(Method::GET, collection)
            .query(&[("_page", page), ("_limit", limit)]);
        self.send_json(builder, collection).await
    }

    /// The mock API has no count endpoint: the unfiltered collection length is the total.
    async fn count(&self, collection: &str) -> ApiResult<usize> {
        let builder = self.request(Method::GET, collection);
        let items = self.send_json::<Vec<Value>>(builder, collection).await?;
        Ok(items.len())
    }

    async fn get_optional<T>(&self, path: &str) -> ApiResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(|source| ApiError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response
                    .json::<T>()
                    .await
                    .map(Some)
                    .map_err(|source| ApiError::Decode {
                        path: path.to_string(),
                        source,
                    })
            }
            other => Err(ApiError::Status {
                path: path.to_string(),
                status: other,
            }),
        }
    }

    async fn write_json<B, T>(&self, method: Method, path: &str, body: &B) -> ApiResult<T>
    where
        B: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        let builder = self.request(method, path).json(body);
        self.send_json(builder, path).await
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        let builder = self.request(Method::DELETE, path);
        self.send(builder, path).await.map(|_| ())
    }

    async fn engine<T>(&self, id: CarId, command: EngineCommand) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let builder = self
            .request(Method::PATCH, ENGINE)
            .query(&[("id", id.to_string()), ("status", command.as_str().to_string())]);
        self.send_json(builder, ENGINE).await
    }
}

impl EngineApi for RestClient {
    fn start_engine(&self, id: CarId) -> BoxFuture<'static, ApiResult<EngineStatus>> {
        let client = self.clone();
        Box::pin(async move { client.engine(id, EngineCommand::Started).await })
    }

    fn stop_engine(&self, id: CarId) -> BoxFuture<'static, ApiResult<EngineStatus>> {
        let client = self.clone();
        Box::pin(async move { client.engine(id, EngineCommand::Stopped).await })
    }

    fn drive(&self, id: CarId) -> BoxFuture<'static, ApiResult<DriveOutcome>> {
        let client = self.clone();
        Box::pin(async move { client.engine(id, EngineCommand::Drive).await })
    }
}

impl GarageApi for RestClient {
    fn list_cars(&self, page: u32, limit: u32) -> BoxFuture<'static, ApiResult<Vec<Car>>> {
        let client = self.clone();
        Box::pin(async move { client.get_page(GARAGE, page, limit).await })
    }

    fn count_cars(&self) -> BoxFuture<'static, ApiResult<usize>> {
        let client = self.clone();
        Box::pin(async move { client.count(GARAGE).await })
    }

    fn create_car(&self, input: CarInput) -> BoxFuture<'static, ApiResult<Car>> {
        let client = self.clone();
        Box::pin(async move { client.write_json(Method::POST, GARAGE, &input).await })
    }

    fn update_car(&self, id: CarId, input: CarInput) -> BoxFuture<'static, ApiResult<Car>> {
        let client = self.clone();
        Box::pin(async move {
            let path = format!("{GARAGE}/{id}");
            client.write_json(Method::PUT, &path, &input).await
        })
    }

    fn delete_car(&self, id: CarId) -> BoxFuture<'static, ApiResult<()>> {
        let client = self.clone();
        Box::pin(async move { client.delete(&format!("{GARAGE}/{id}")).await })
    }
}

impl WinnersApi for RestClient {
    fn list_winners(&self, page: u32, limit: u32) -> BoxFuture<'static, ApiResult<Vec<Winner>>> {
        let client = self.clone();
        Box::pin(async move { client.get_page(WINNERS, page, limit).await })
    }

    fn count_winners(&self) -> BoxFuture<'static, ApiResult<usize>> {
        let client = self.clone();
        Box::pin(async move { client.count(WINNERS).await })
    }

    fn find_winner(&self, id: CarId) -> BoxFuture<'static, ApiResult<Option<Winner>>> {
        let client = self.clone();
        Box::pin(async move { client.get_optional(&format!("{WINNERS}/{id}")).await })
    }

    fn create_winner(&self, winner: Winner) -> BoxFuture<'static, ApiResult<Winner>> {
        let client = self.clone();
        Box::pin(async move { client.write_json(Method::POST, WINNERS, &winner).await })
    }

    fn update_winner(
        &self,
        id: CarId,
        update: WinnerUpdate,
    ) -> BoxFuture<'static, ApiResult<Winner>> {
        let client = self.clone();
        Box::pin(async move {
            let path = format!("{WINNERS}/{id}");
            client.write_json(Method::PUT, &path, &update).await
        })
    }

    fn delete_winner(&self, id: CarId) -> BoxFuture<'static, ApiResult<()>> {
        let client = self.clone();
        Box::pin(async move { client.delete(&format!("{WINNERS}/{id}")).await })
    }
}
