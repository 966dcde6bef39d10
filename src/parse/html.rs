//! HTML field extraction

use super::{normalize_whitespace, HtmlInfo};
use scraper::{ElementRef, Html, Selector};

/// Most words of div text kept per page
const MAX_DIV_WORDS: usize = 500;

/// Hard cap on div text for pages with run-on "words"
const MAX_DIV_CHARS: usize = MAX_DIV_WORDS * 10;

/// Whether a content type is worth handing to the HTML parser
pub fn is_parsable_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => ct.contains("html") || ct.contains("xml"),
        None => true,
    }
}

/// Extract title, description, headers and div text from a page
pub fn parse_html_info(content: &str, content_type: Option<&str>) -> HtmlInfo {
    let mut info = HtmlInfo::default();
    if !is_parsable_content_type(content_type) {
        return info;
    }

    let document = Html::parse_document(content);

    if let Ok(selector) = Selector::parse("title") {
        info.title = document
            .select(&selector)
            .next()
            .map(|e| normalize_whitespace(&e.text().collect::<String>()))
            .filter(|t| !t.is_empty());
    }

    if let Ok(selector) = Selector::parse(r#"meta[name="description"]"#) {
        info.description = document
            .select(&selector)
            .next()
            .and_then(|e| e.value().attr("content"))
            .map(normalize_whitespace)
            .filter(|d| !d.is_empty());
    }

    let link_selector = Selector::parse("a").ok();
    for level in 1..=6 {
        let Ok(selector) = Selector::parse(&format!("h{}", level)) else {
            continue;
        };
        info.headers[level - 1] = document
            .select(&selector)
            .filter(|header| !contains_link(header, link_selector.as_ref()))
            .map(|header| element_text(&header))
            .filter(|text| !text.is_empty())
            .collect();
    }

    if let Ok(selector) = Selector::parse("div") {
        let mut div_text = String::new();
        let mut word_count = 0;
        for div in document.select(&selector) {
            let text = element_text(&div);
            if text.is_empty() {
                continue;
            }
            let words = text.split_whitespace().count();
            if word_count + words > MAX_DIV_WORDS {
                break;
            }
            word_count += words;
            div_text.push_str(&text);
            div_text.push(' ');
        }
        let div_text: String = div_text.trim_end().chars().take(MAX_DIV_CHARS).collect();
        if !div_text.is_empty() {
            info.div = Some(div_text);
        }
    }

    info
}

fn element_text(element: &ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn contains_link(element: &ElementRef<'_>, link_selector: Option<&Selector>) -> bool {
    link_selector
        .map(|s| element.select(s).next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_html_basic() {
        let html = r#"
        <!DOCTYPE html>
        <html>
        <head>
            <title> Police   Department </title>
            <meta name="description" content="Records and reports">
        </head>
        <body>
            <h1>Annual Reports</h1>
            <h2><a href="/home">Home</a></h2>
            <h2>Crime Statistics</h2>
            <div>Monthly crime data for the county.</div>
        </body>
        </html>
        "#;

        let info = parse_html_info(html, Some("text/html"));
        assert_eq!(info.title.as_deref(), Some("Police Department"));
        assert_eq!(info.description.as_deref(), Some("Records and reports"));
        assert_eq!(info.headers[0], vec!["Annual Reports".to_string()]);
        assert_eq!(info.headers[1], vec!["Crime Statistics".to_string()]);
        assert_eq!(
            info.div.as_deref(),
            Some("Monthly crime data for the county.")
        );
    }

    #[test]
    fn test_div_text_word_limit() {
        let long = "word ".repeat(400);
        let html = format!("<div>{}</div><div>{}</div><div>short tail</div>", long, long);

        let info = parse_html_info(&html, Some("text/html"));
        let div = info.div.unwrap();
        assert_eq!(div.split_whitespace().count(), 400);
    }

    #[test]
    fn test_non_html_content_is_skipped() {
        let info = parse_html_info("%PDF-1.7", Some("application/pdf"));
        assert!(info.is_empty());
    }
}
