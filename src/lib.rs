pub mod api;
pub mod carousel;
pub mod client;
pub mod gallery;
pub mod navigation;
pub mod pager;
pub mod post_index;
pub mod timeline;
pub mod toc;
pub mod types;
