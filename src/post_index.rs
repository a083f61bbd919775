use anyhow::{anyhow, Result};
use moka::future::Cache;
use std::sync::Arc;
use tracing::info;

use crate::{
    api::Api,
    toc::{generate_toc, TocItem},
    types::Post,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    Mouse,
    Touch,
}

/// Post list for one publish year with an in-page preview of the selected post.
pub struct PostIndex {
    api: Api,
    year: Option<i32>,
    years: Vec<i32>,
    posts: Vec<Post>,
    path_view_count: u64,
    selected: Option<i64>,
    bodies: Cache<i64, Arc<String>>,
}

impl PostIndex {
    /// Loads the year list and the posts of `year` (latest year when `None`).
    pub async fn load(api: Api, year: Option<i32>) -> Result<Self> {
        let years = api.post_years().await?;
        let year = year.or_else(|| years.iter().copied().max());
        let resp = api.posts(year).await?;
        info!("Loaded {} posts for year {:?}", resp.data.len(), year);

        Ok(Self {
            api,
            year,
            years,
            posts: resp.data,
            path_view_count: resp.path_view_count,
            selected: None,
            bodies: Cache::new(64),
        })
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn path_view_count(&self) -> u64 {
        self.path_view_count
    }

    pub fn selected(&self) -> Option<i64> {
        self.selected
    }

    pub fn selected_post(&self) -> Option<&Post> {
        let id = self.selected?;
        self.posts.iter().find(|p| p.id == id)
    }

    /// Syncs the selection with the `id` route parameter.
    pub fn select_from_route(&mut self, id: Option<&str>) {
        self.selected = id.and_then(|s| s.parse().ok()).filter(|id| *id != 0);
    }

    fn year_query(&self) -> String {
        match self.year {
            Some(year) => format!("?year={}", year),
            None => String::new(),
        }
    }

    /// Route that opens the in-page preview of `id`.
    pub fn show(&mut self, id: i64) -> String {
        self.selected = Some(id);
        format!("/post/thumbnail/{}{}", id, self.year_query())
    }

    pub fn hide(&mut self) -> String {
        self.selected = None;
        format!("/post{}", self.year_query())
    }

    /// Mouse taps preview in place unless a modifier is held; touch opens the full page.
    pub fn tap(&mut self, id: i64, pointer: Pointer, modifier: bool) -> String {
        match pointer {
            Pointer::Mouse if !modifier => self.show(id),
            _ => format!("/post/{}", id),
        }
    }

    pub fn handle_key(&mut self, key: &str) -> Option<String> {
        match key {
            "Escape" if self.selected.is_some() => Some(self.hide()),
            "." => Some(match self.selected {
                Some(id) => format!("/post/publish/{}", id),
                None => "/post/publish".to_string(),
            }),
            _ => None,
        }
    }

    /// Markdown body of the selected post, fetched once per id.
    pub async fn selected_body(&self) -> Result<Option<Arc<String>>> {
        let Some(id) = self.selected else {
            return Ok(None);
        };
        let api = self.api.clone();
        let body = self
            .bodies
            .try_get_with(id, async move {
                let post = api.post(id).await?;
                Ok::<_, anyhow::Error>(Arc::new(post.content.unwrap_or_default()))
            })
            .await
            .map_err(|e| anyhow!("Failed to load post {}: {}", id, e))?;
        Ok(Some(body))
    }

    pub async fn selected_toc(&self) -> Result<Vec<TocItem>> {
        Ok(self
            .selected_body()
            .await?
            .map(|body| generate_toc(&body))
            .unwrap_or_default())
    }
}
