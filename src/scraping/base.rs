use std::{thread, time::Duration};

use scraper::{ElementRef, Selector};
use sha2::{Digest, Sha256};

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .map(inner_text)
        .find(|text| !text.is_empty())
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with("mailto:") {
        return None;
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    let mut joined = base_url.join(href).ok()?;
    if !matches!(joined.scheme(), "http" | "https") {
        return None;
    }
    joined.set_fragment(None);
    Some(joined.to_string())
}

/// Stable row id for a canonical source URL.
pub fn url_id(source_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn absolutizes_and_strips_fragments() {
        let base = "https://www.passo.com.tr/tr/kategori/muzik/8615";
        assert_eq!(
            absolute_url(base, Some("/tr/etkinlik/konser/123#tickets".into())),
            Some("https://www.passo.com.tr/tr/etkinlik/konser/123".to_string())
        );
        assert_eq!(
            absolute_url(base, Some("https://biletix.com/etkinlik/X".into())),
            Some("https://biletix.com/etkinlik/X".to_string())
        );
        assert_eq!(absolute_url(base, Some("javascript:void(0)".into())), None);
        assert_eq!(absolute_url(base, Some("  ".into())), None);
        assert_eq!(absolute_url(base, None), None);
    }

    #[test]
    fn first_text_skips_empty_matches() {
        let document = Html::parse_fragment(r#"<div><p class="x"> </p><p class="x">  Mabel   Matiz </p></div>"#);
        let selector = Selector::parse("p.x").expect("selector");
        let root = document.root_element();
        assert_eq!(first_text(&root, &selector), Some("Mabel Matiz".to_string()));
    }

    #[test]
    fn url_id_is_stable() {
        let a = url_id("https://bubilet.com.tr/ankara/etkinlik/x");
        assert_eq!(a, url_id("https://bubilet.com.tr/ankara/etkinlik/x"));
        assert_ne!(a, url_id("https://bubilet.com.tr/ankara/etkinlik/y"));
        assert_eq!(a.len(), 64);
    }
}
