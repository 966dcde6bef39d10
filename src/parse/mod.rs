//! Page content extraction
//!
//! Pulls the handful of fields the classifiers work from out of a fetched
//! page: title, meta description, header text per level and leading div text.

mod html;

pub use html::*;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Which extracted field a stored HTML content row holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HtmlField {
    Title,
    Description,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Div,
}

impl HtmlField {
    pub const HEADERS: [HtmlField; 6] = [
        HtmlField::H1,
        HtmlField::H2,
        HtmlField::H3,
        HtmlField::H4,
        HtmlField::H5,
        HtmlField::H6,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HtmlField::Title => "title",
            HtmlField::Description => "description",
            HtmlField::H1 => "h1",
            HtmlField::H2 => "h2",
            HtmlField::H3 => "h3",
            HtmlField::H4 => "h4",
            HtmlField::H5 => "h5",
            HtmlField::H6 => "h6",
            HtmlField::Div => "div",
        }
    }
}

impl std::fmt::Display for HtmlField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HtmlField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "title" => Ok(HtmlField::Title),
            "description" => Ok(HtmlField::Description),
            "h1" => Ok(HtmlField::H1),
            "h2" => Ok(HtmlField::H2),
            "h3" => Ok(HtmlField::H3),
            "h4" => Ok(HtmlField::H4),
            "h5" => Ok(HtmlField::H5),
            "h6" => Ok(HtmlField::H6),
            "div" => Ok(HtmlField::Div),
            _ => Err(Error::Parse(format!("Unknown HTML field: {}", s))),
        }
    }
}

/// Fields extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlInfo {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Header text per level, h1 first; headers wrapping links are dropped
    pub headers: [Vec<String>; 6],
    pub div: Option<String>,
}

impl HtmlInfo {
    /// Non-empty fields as storable rows; header levels are JSON arrays
    pub fn fields(&self) -> Vec<(HtmlField, String)> {
        let mut fields = Vec::new();
        if let Some(title) = &self.title {
            fields.push((HtmlField::Title, title.clone()));
        }
        if let Some(description) = &self.description {
            fields.push((HtmlField::Description, description.clone()));
        }
        for (field, headers) in HtmlField::HEADERS.iter().zip(self.headers.iter()) {
            if headers.is_empty() {
                continue;
            }
            if let Ok(json) = serde_json::to_string(headers) {
                fields.push((*field, json));
            }
        }
        if let Some(div) = &self.div {
            fields.push((HtmlField::Div, div.clone()));
        }
        fields
    }

    /// Rebuild from stored rows, ignoring rows it does not recognize
    pub fn from_fields<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut info = HtmlInfo::default();
        for (name, content) in rows {
            let Ok(field) = name.parse::<HtmlField>() else {
                continue;
            };
            match field {
                HtmlField::Title => info.title = Some(content.to_string()),
                HtmlField::Description => info.description = Some(content.to_string()),
                HtmlField::Div => info.div = Some(content.to_string()),
                header => {
                    let level = HtmlField::HEADERS
                        .iter()
                        .position(|h| *h == header)
                        .unwrap_or(0);
                    info.headers[level] = serde_json::from_str(content).unwrap_or_default();
                }
            }
        }
        info
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

/// Collapse runs of whitespace into single spaces
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
