use actix_web::HttpResponse;
use rust_embed::RustEmbed;
use mime_guess::from_path;

#[derive(RustEmbed)]
#[folder = "static"]
pub struct Assets;

/// Embedded text asset (templates), as UTF-8.
pub fn asset_text(name: &str) -> anyhow::Result<String> {
    let file = Assets::get(name)
        .ok_or_else(|| anyhow::anyhow!("Asset {} not found", name))?;
    Ok(String::from_utf8(file.data.into_owned())?)
}

pub fn serve_static(path: &str) -> HttpResponse {
    let file_path = path.trim_start_matches("/static/").trim_start_matches('/');

    // Templates are rendered, never served raw
    if file_path.ends_with(".html") {
        return HttpResponse::NotFound().body("Not found");
    }

    match Assets::get(file_path) {
        Some(file) => {
            let mime = from_path(file_path).first_or_octet_stream();
            HttpResponse::Ok()
                .content_type(mime.as_ref())
                .body(file.data.into_owned())
        }
        None => HttpResponse::NotFound().body("Not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn serves_stylesheet_with_mime() {
        let resp = serve_static("/static/style.css");
        assert_eq!(resp.status(), StatusCode::OK);
        let ct = resp.headers().get("content-type").and_then(|v| v.to_str().ok()).unwrap_or_default();
        assert!(ct.starts_with("text/css"));
    }

    #[test]
    fn hides_templates_and_unknown_files() {
        assert_eq!(serve_static("/static/layout.html").status(), StatusCode::NOT_FOUND);
        assert_eq!(serve_static("/static/nope.js").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn layout_template_is_embedded() {
        let layout = asset_text("layout.html").unwrap();
        assert!(layout.contains("PAGE_BODY"));
    }
}
