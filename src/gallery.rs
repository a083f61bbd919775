use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::{
    api::Api,
    carousel::{AssetUrls, Carousel, Viewport},
    client::Query,
    pager::{Direction, InfiniteList, PageOrder, PageRequest, PageSource},
    types::{Asset, Page},
};

pub const GALLERY_PAGE_SIZE: i64 = 30;

pub struct AssetSource {
    api: Api,
}

impl AssetSource {
    pub fn new(api: Api) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PageSource<Asset> for AssetSource {
    async fn fetch(&self, request: PageRequest) -> Result<Page<Asset>> {
        let key = match request.direction {
            Direction::Next => "nextCursor",
            Direction::Previous => "prevCursor",
        };
        let query = Query::new().with(key, request.cursor.to_string());
        Ok(self.api.assets(query).await?.data)
    }
}

/// Masonry photo wall. Loading more walks backwards through the archive.
pub struct Gallery {
    source: AssetSource,
    list: InfiniteList<Asset>,
    carousel: Carousel,
}

impl Gallery {
    pub async fn load(api: Api, urls: AssetUrls, viewport: Viewport) -> Result<Self> {
        let resp = api
            .assets(Query::new().with("size", GALLERY_PAGE_SIZE))
            .await?;
        info!("Gallery seeded with {} assets", resp.data.resources.len());
        Ok(Self::seeded(AssetSource::new(api), resp.data, urls, viewport))
    }

    pub fn seeded(
        source: AssetSource,
        page: Page<Asset>,
        urls: AssetUrls,
        viewport: Viewport,
    ) -> Self {
        let list = InfiniteList::seeded(page);
        let carousel = Carousel::new(list.items(PageOrder::Reversed), urls, viewport);
        Self {
            source,
            list,
            carousel,
        }
    }

    pub fn assets(&self) -> Vec<Asset> {
        self.list.items(PageOrder::Reversed)
    }

    pub fn has_more(&self) -> bool {
        self.list.has_previous()
    }

    pub async fn load_more(&mut self) -> Result<bool> {
        if !self.list.fetch_previous(&self.source).await? {
            return Ok(false);
        }
        self.carousel.set_assets(self.assets());
        Ok(true)
    }

    pub fn preview<F>(&mut self, index: usize, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.carousel.open(index, teardown);
    }

    pub fn carousel(&self) -> &Carousel {
        &self.carousel
    }

    pub fn carousel_mut(&mut self) -> &mut Carousel {
        &mut self.carousel
    }
}
