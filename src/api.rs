use anyhow::Result;
use tracing::debug;

use crate::{
    client::{Body, Client, FormData, Query, RequestOptions},
    types::{ApiResponse, Asset, Feed, Page, Post, User},
};

/// Typed wrappers for the backend endpoints.
#[derive(Clone)]
pub struct Api {
    client: Client,
}

impl Api {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn posts(&self, year: Option<i32>) -> Result<ApiResponse<Vec<Post>>> {
        let query = Query::new().with_opt("publishYear", year);
        Ok(self
            .client
            .request("/public/post", RequestOptions::get().query(query))
            .await?)
    }

    pub async fn post_years(&self) -> Result<Vec<i32>> {
        let resp: ApiResponse<Vec<i32>> = self
            .client
            .request("/public/post/years", RequestOptions::get())
            .await?;
        Ok(resp.data)
    }

    pub async fn post(&self, id: i64) -> Result<Post> {
        let resp: ApiResponse<Post> = self
            .client
            .request(&format!("/public/post/{}", id), RequestOptions::get())
            .await?;
        Ok(resp.data)
    }

    pub async fn assets(&self, query: Query) -> Result<ApiResponse<Page<Asset>>> {
        Ok(self
            .client
            .request("/public/asset", RequestOptions::get().query(query))
            .await?)
    }

    pub async fn feeds(&self, query: Query) -> Result<ApiResponse<Page<Feed>>> {
        Ok(self
            .client
            .request("/public/feed", RequestOptions::get().query(query))
            .await?)
    }

    pub async fn create_feed(&self, form: FormData) -> Result<serde_json::Value> {
        let resp: ApiResponse<serde_json::Value> = self
            .client
            .request("/feed", RequestOptions::post(Body::Multipart(form)))
            .await?;
        Ok(resp.data)
    }

    /// The signed-in user, or `None` for anonymous visitors. Never notifies.
    pub async fn current_user(&self) -> Option<User> {
        match self
            .client
            .request::<User>("/user/current", RequestOptions::get().silent())
            .await
        {
            Ok(resp) if resp.data.id != 0 => Some(resp.data),
            Ok(_) => None,
            Err(e) => {
                debug!("No current user: {}", e);
                None
            }
        }
    }
}
