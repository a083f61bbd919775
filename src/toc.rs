use once_cell::sync::Lazy;
use pulldown_cmark::{
    html, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd, TextMergeStream,
};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocItem {
    pub level: u8,
    pub id: String,
    pub title: String,
}

/// GitHub-style heading slugs, unique per document.
#[derive(Debug, Default)]
pub struct Slugger {
    occurrences: HashMap<String, usize>,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slug(&mut self, title: &str) -> String {
        let original = slugify(title);
        let mut slug = original.clone();
        while self.occurrences.contains_key(&slug) {
            let count = self.occurrences.entry(original.clone()).or_insert(0);
            *count += 1;
            slug = format!("{}-{}", original, count);
        }
        self.occurrences.insert(slug.clone(), 0);
        slug
    }
}

fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .map(|c| if c == ' ' { '-' } else { c })
        .collect()
}

/// Removes a leading `---` (YAML) or `+++` (TOML) front matter block.
pub fn strip_front_matter(text: &str) -> &str {
    let fence = if text.starts_with("---") {
        "---"
    } else if text.starts_with("+++") {
        "+++"
    } else {
        return text;
    };

    let mut offset = 0;
    let mut lines = text.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == fence => offset += first.len(),
        _ => return text,
    }

    for line in lines {
        offset += line.len();
        let trimmed = line.trim_end();
        if trimmed == fence || (fence == "---" && trimmed == "...") {
            return &text[offset..];
        }
    }
    text
}

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);
    options
}

pub fn generate_toc(content: &str) -> Vec<TocItem> {
    let body = strip_front_matter(content);
    let mut slugger = Slugger::new();
    let mut toc = Vec::new();
    let mut current: Option<(u8, String)> = None;
    // alt text of images is not part of a heading's title
    let mut images = 0usize;

    for event in Parser::new_ext(body, options()) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some((level as u8, String::new()));
            }
            Event::Start(Tag::Image { .. }) => images += 1,
            Event::End(TagEnd::Image) => images = images.saturating_sub(1),
            Event::Text(text) | Event::Code(text) if images == 0 => {
                if let Some((_, title)) = current.as_mut() {
                    title.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, title)) = current.as_mut() {
                    title.push(' ');
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, title)) = current.take() {
                    toc.push(TocItem {
                        level,
                        id: slugger.slug(&title),
                        title,
                    });
                }
            }
            _ => {}
        }
    }
    toc
}

/// Renders the document to HTML with the same heading ids `generate_toc` produces.
pub fn render_html(content: &str) -> String {
    let body = strip_front_matter(content);
    let mut ids = generate_toc(content).into_iter().map(|item| item.id);

    let parsed = autolink(TextMergeStream::new(Parser::new_ext(body, options())));
    let events = parsed.into_iter().map(|event| match event {
        Event::Start(Tag::Heading {
            level,
            id: None,
            classes,
            attrs,
        }) => Event::Start(Tag::Heading {
            level,
            id: ids.next().map(CowStr::from),
            classes,
            attrs,
        }),
        other => other,
    });

    let mut out = String::with_capacity(body.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

static BARE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://|www\.)[^\s<]+").expect("bare url regex should compile")
});

/// Turns bare `http://`, `https://` and `www.` urls in text into links, the
/// way GitHub does. Text inside links, images and code is left alone.
fn autolink<'a>(events: impl Iterator<Item = Event<'a>>) -> Vec<Event<'a>> {
    let mut out = Vec::new();
    let mut opaque = 0usize;

    for event in events {
        match &event {
            Event::Start(Tag::Link { .. } | Tag::Image { .. } | Tag::CodeBlock(_)) => {
                opaque += 1
            }
            Event::End(TagEnd::Link | TagEnd::Image | TagEnd::CodeBlock) => {
                opaque = opaque.saturating_sub(1)
            }
            Event::InlineHtml(tag) if is_anchor_open(tag) => opaque += 1,
            Event::InlineHtml(tag) if tag.trim_start().starts_with("</a") => {
                opaque = opaque.saturating_sub(1)
            }
            Event::Text(text) if opaque == 0 => {
                link_text(&mut out, text);
                continue;
            }
            _ => {}
        }
        out.push(event);
    }
    out
}

fn is_anchor_open(tag: &str) -> bool {
    let tag = tag.trim_start();
    tag.starts_with("<a ") || tag.starts_with("<a>") || tag.starts_with("<a\n")
}

fn link_text<'a>(out: &mut Vec<Event<'a>>, text: &str) {
    let mut last = 0;
    for found in BARE_URL.find_iter(text) {
        let start = found.start();
        let boundary = text[..start]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace() || matches!(c, '(' | '*' | '_' | '~'));
        let url = trim_url(found.as_str());
        if !boundary || url.ends_with("://") || url == "www." {
            continue;
        }

        if last < start {
            out.push(Event::Text(CowStr::from(text[last..start].to_string())));
        }
        let href = if url.starts_with("www.") {
            format!("http://{}", url)
        } else {
            url.to_string()
        };
        out.push(Event::Start(Tag::Link {
            link_type: LinkType::Autolink,
            dest_url: CowStr::from(href),
            title: CowStr::from(""),
            id: CowStr::from(""),
        }));
        out.push(Event::Text(CowStr::from(url.to_string())));
        out.push(Event::End(TagEnd::Link));
        last = start + url.len();
    }
    if last < text.len() {
        out.push(Event::Text(CowStr::from(text[last..].to_string())));
    }
}

/// Drops trailing punctuation and unbalanced closing parentheses.
fn trim_url(url: &str) -> &str {
    let mut url = url;
    loop {
        let Some(last) = url.chars().next_back() else {
            return url;
        };
        let unbalanced = last == ')' && url.matches(')').count() > url.matches('(').count();
        if matches!(last, '?' | '!' | '.' | ',' | ':' | '*' | '_' | '~' | '\'' | '"')
            || unbalanced
        {
            url = &url[..url.len() - last.len_utf8()];
        } else {
            return url;
        }
    }
}
