//! Upload page rendering

use std::fmt::Write;
use std::path::Path;

use axum::{extract::State, response::Html};

use leaf_classifier::Classification;

use crate::state::SharedState;

/// Logo files looked up in the static directory, first match wins
pub const LOGO_CANDIDATES: [&str; 8] = [
    "logo_fpt.png",
    "logo_fpt.jpg",
    "logo_fpt.jpeg",
    "logo_fpt.webp",
    "logo.png",
    "logo.jpg",
    "logo.jpeg",
    "logo.webp",
];

/// Name of the first logo present in `static_dir`
pub fn find_logo(static_dir: &Path) -> Option<&'static str> {
    LOGO_CANDIDATES
        .iter()
        .copied()
        .find(|name| static_dir.join(name).is_file())
}

/// What the page shows below the upload form
pub enum Outcome<'a> {
    Empty,
    Result {
        file_name: &'a str,
        classification: &'a Classification,
        uncertain: bool,
    },
    Error(&'a str),
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"
body { margin: 0; font-family: ui-sans-serif, system-ui, -apple-system, Segoe UI, Roboto, Arial; color: #0f172a;
       background: linear-gradient(125deg, rgba(255,122,122,.22), rgba(255,184,108,.22), rgba(0,194,255,.22)); min-height: 100vh; }
.container { max-width: 1080px; margin: 0 auto; padding: 28px; }
.navbar { display: flex; justify-content: center; padding: 16px; border: 1px solid #e5e7eb; border-radius: 14px; background: rgba(255,255,255,.6); font-weight: 900; font-size: 24px; }
.grid { display: grid; grid-template-columns: 1.1fr .9fr; gap: 24px; margin-top: 22px; }
@media (max-width: 960px) { .grid { grid-template-columns: 1fr; } }
.card { background: #fff; border: 1px solid #e5e7eb; border-radius: 16px; padding: 18px; }
.card-title { display: flex; align-items: center; justify-content: space-between; margin-bottom: 14px; }
.pill { background: linear-gradient(135deg, #ffd1dc, #ffe1a8, #c2f5ff); padding: 6px 12px; border-radius: 9999px; font-weight: 800; font-size: 13px; }
.pill.warn { background: #fde68a; }
.btn { padding: 12px 18px; border: none; border-radius: 12px; color: #fff; font-weight: 700; cursor: pointer; background: linear-gradient(135deg, #ff4d6d, #7b2ff7, #00c2ff); }
.muted { color: #64748b; }
.error { color: #b91c1c; font-weight: 700; }
table { width: 100%; border-collapse: collapse; }
th, td { text-align: left; padding: 10px; border-bottom: 1px solid #e5e7eb; }
.bar { height: 12px; background: #e2e8f0; border-radius: 9999px; overflow: hidden; }
.bar > span { display: block; height: 100%; background: linear-gradient(90deg, #ff4d6d, #7b2ff7, #00c2ff); }
img { max-width: 100%; height: auto; border-radius: 12px; border: 1px solid #e5e7eb; }
.corner-logo { position: fixed; top: 14px; right: 14px; width: 108px; border: none; }
.footer { margin-top: 18px; color: #64748b; font-size: 14px; }
"#;

/// Render the full page
pub fn render(state: &SharedState, outcome: Outcome<'_>) -> String {
    let labels: Vec<&str> = state.classifier.labels().iter().collect();
    let target = state.classifier.target();

    let mut html = String::new();
    html.push_str("<!doctype html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\" />\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n");
    html.push_str("<title>Plant Disease Classifier</title>\n");
    let _ = write!(html, "<style>{}</style>\n</head>\n<body>\n", STYLE);

    if let Some(logo) = find_logo(&state.config.static_dir) {
        let _ = writeln!(html, "<img class=\"corner-logo\" src=\"/static/{}\" alt=\"Logo\" />", logo);
    }

    html.push_str("<div class=\"container\">\n");
    html.push_str("<div class=\"navbar\">&#127807; Plant Disease Classifier</div>\n");
    html.push_str("<div class=\"grid\">\n");

    html.push_str(
        r#"<div class="card">
<div class="card-title"><h3 style="margin:0;">Upload</h3></div>
<form method="post" action="/predict" enctype="multipart/form-data">
<div style="font-weight:700;">Choose an image</div>
<div class="muted" style="font-size:14px;">Supported: jpg, jpeg, png, webp</div>
<p><input type="file" name="image" accept="image/*" required /></p>
<button class="btn" type="submit">Predict</button>
<span class="muted">The model will return class and probabilities.</span>
</form>
</div>
"#,
    );

    html.push_str("<div class=\"card\">\n<div class=\"card-title\"><h3 style=\"margin:0;\">Preview</h3></div>\n");
    match &outcome {
        Outcome::Result { file_name, .. } => {
            let name = escape_html(file_name);
            let _ = writeln!(
                html,
                "<img id=\"previewImg\" src=\"/uploads/{}\" alt=\"Uploaded image\" />\n<div class=\"footer\">File: {}</div>",
                name, name
            );
        }
        Outcome::Error(message) => {
            let _ = writeln!(html, "<div class=\"error\">{}</div>", escape_html(message));
        }
        Outcome::Empty => html.push_str("<div class=\"muted\">No image uploaded yet.</div>\n"),
    }
    html.push_str("</div>\n</div>\n");

    if let Outcome::Result {
        classification,
        uncertain,
        ..
    } = &outcome
    {
        html.push_str("<div class=\"card\" style=\"margin-top:22px;\">\n<div class=\"card-title\">\n<h3 style=\"margin:0;\">Result</h3>\n");
        let _ = writeln!(
            html,
            "<span class=\"pill\">{} ({:.2}%)</span>",
            escape_html(&classification.label),
            classification.confidence_percent()
        );
        if *uncertain {
            html.push_str("<span class=\"pill warn\">uncertain</span>\n");
        }
        html.push_str("</div>\n<table>\n<thead><tr><th>Label</th><th style=\"width:60%;\">Probability</th><th style=\"text-align:right;\">Score</th></tr></thead>\n<tbody>\n");
        for entry in &classification.probabilities {
            let percent = entry.probability as f64 * 100.0;
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td><div class=\"bar\"><span style=\"width: {:.2}%\"></span></div></td><td style=\"text-align:right; white-space:nowrap;\">{:.4} ({:.2}%)</td></tr>",
                escape_html(&entry.label),
                percent,
                entry.probability,
                percent
            );
        }
        html.push_str("</tbody>\n</table>\n</div>\n");
    }

    let _ = writeln!(
        html,
        "<div class=\"footer\">Labels: {} &middot; Device: {}</div>",
        escape_html(&labels.join(", ")),
        target
    );
    html.push_str("</div>\n</body>\n</html>\n");
    html
}

/// GET / - Upload page
pub async fn index(State(state): State<SharedState>) -> Html<String> {
    Html(render(&state, Outcome::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{get, read_body, test_app};
    use axum::http::StatusCode;
    use tempfile::TempDir;

    #[test]
    fn test_find_logo_prefers_first_candidate() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_logo(dir.path()), None);

        std::fs::write(dir.path().join("logo.webp"), b"x").unwrap();
        assert_eq!(find_logo(dir.path()), Some("logo.webp"));

        std::fs::write(dir.path().join("logo_fpt.jpg"), b"x").unwrap();
        assert_eq!(find_logo(dir.path()), Some("logo_fpt.jpg"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">&'"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }

    #[tokio::test]
    async fn test_index_lists_labels() {
        let (app, _dir) = test_app();
        let response = get(app, "/").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = String::from_utf8(read_body(response).await.to_vec()).unwrap();
        assert!(body.contains("name=\"image\""));
        assert!(body.contains("anthracnose, healthy, powdery, rust, sooty_mold, spot, yellow"));
        assert!(body.contains("No image uploaded yet."));
    }
}
