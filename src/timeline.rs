use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    api::Api,
    carousel::{AssetUrls, Carousel, Viewport},
    client::{FormData, Query},
    navigation::Navigator,
    pager::{InfiniteList, PageOrder, PageRequest, PageSource},
    types::{Feed, Page, User},
};

pub const TIMELINE_PAGE_SIZE: i64 = 10;

pub struct FeedSource {
    api: Api,
}

impl FeedSource {
    pub fn new(api: Api) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PageSource<Feed> for FeedSource {
    async fn fetch(&self, request: PageRequest) -> Result<Page<Feed>> {
        let query = Query::new()
            .with("cursor", request.cursor.to_string())
            .with("size", TIMELINE_PAGE_SIZE);
        Ok(self.api.feeds(query).await?.data)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedForm {
    pub content: String,
    pub public: bool,
    pub assets: Vec<Upload>,
}

impl Default for FeedForm {
    fn default() -> Self {
        Self {
            content: String::new(),
            public: true,
            assets: Vec::new(),
        }
    }
}

impl FeedForm {
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.content.is_empty() {
            return Err(FieldError {
                field: "content",
                message: "content is required",
            });
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        !self.content.is_empty() || !self.assets.is_empty()
    }

    pub fn to_form_data(&self) -> FormData {
        let mut form = FormData::new();
        for upload in &self.assets {
            form.append_file("assets", &upload.file_name, &upload.mime, upload.bytes.clone());
        }
        form.append("content", &self.content);
        form.append("public", if self.public { "true" } else { "false" });
        form
    }
}

/// Holds the in-flight flag for one submission and clears it when dropped,
/// including when the submitting future is cancelled.
struct InFlight<'a>(&'a mut bool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Sent,
    Invalid(FieldError),
    Busy,
}

pub struct Timeline {
    api: Api,
    source: FeedSource,
    list: InfiniteList<Feed>,
    user: Option<User>,
    path_view_count: u64,
    form: FeedForm,
    error: Option<FieldError>,
    submitting: bool,
}

impl Timeline {
    pub async fn load(api: Api) -> Result<Self> {
        let resp = api
            .feeds(Query::new().with("size", TIMELINE_PAGE_SIZE))
            .await?;
        let user = api.current_user().await;
        info!("Timeline seeded with {} feeds", resp.data.resources.len());

        Ok(Self {
            source: FeedSource::new(api.clone()),
            api,
            list: InfiniteList::seeded(resp.data),
            user,
            path_view_count: resp.path_view_count,
            form: FeedForm::default(),
            error: None,
            submitting: false,
        })
    }

    pub fn feeds(&self) -> Vec<Feed> {
        self.list.items(PageOrder::Fetched)
    }

    pub fn path_view_count(&self) -> u64 {
        self.path_view_count
    }

    pub fn has_more(&self) -> bool {
        self.list.has_next()
    }

    pub async fn load_more(&mut self) -> Result<bool> {
        self.list.fetch_next(&self.source).await
    }

    pub async fn load_all(&mut self, max_pages: usize) -> Result<usize> {
        self.list.fetch_all_next(&self.source, max_pages).await
    }

    /// Signed-in user, falling back to the author of the newest feed.
    pub fn banner_user(&self) -> Option<User> {
        self.user
            .clone()
            .or_else(|| self.feeds().first().map(|f| f.create_by.clone()))
    }

    pub fn form(&self) -> &FeedForm {
        &self.form
    }

    /// Inline error shown under the content field.
    pub fn error(&self) -> Option<&FieldError> {
        self.error.as_ref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn edit<F>(&mut self, navigator: &mut Navigator, edit: F)
    where
        F: FnOnce(&mut FeedForm),
    {
        edit(&mut self.form);
        navigator.set_unsaved_form(self.form.is_dirty());
    }

    pub async fn submit(&mut self, navigator: &mut Navigator) -> Result<Submission> {
        if self.submitting {
            return Ok(Submission::Busy);
        }
        if let Err(error) = self.form.validate() {
            self.error = Some(error.clone());
            return Ok(Submission::Invalid(error));
        }
        self.error = None;

        let in_flight = InFlight::enter(&mut self.submitting);
        let sent = self.api.create_feed(self.form.to_form_data()).await;
        drop(in_flight);
        if let Err(e) = sent {
            warn!("Failed to publish feed: {}", e);
            return Err(e);
        }

        self.form = FeedForm::default();
        navigator.set_unsaved_form(false);

        let resp = self
            .api
            .feeds(Query::new().with("size", TIMELINE_PAGE_SIZE))
            .await?;
        self.list.reset(resp.data);
        Ok(Submission::Sent)
    }

    /// Carousel over the images attached to one feed.
    pub fn preview(
        &self,
        feed_id: i64,
        urls: AssetUrls,
        viewport: Viewport,
    ) -> Option<Carousel> {
        let feed = self.feeds().into_iter().find(|f| f.id == feed_id)?;
        Some(Carousel::new(feed.assets, urls, viewport))
    }
}
