//! HTTP routes

pub mod health;
pub mod page;
pub mod predict;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

/// Build the application router
pub fn router(state: SharedState) -> Router {
    let uploads = ServeDir::new(&state.config.upload_dir);
    let statics = ServeDir::new(&state.config.static_dir);
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        // Pages
        .route("/", get(page::index))
        .route("/predict", post(predict::predict_page))

        // API
        .route("/api/predict", post(predict::predict_api))
        .route("/health", get(health::health_check))

        // Files
        .nest_service("/uploads", uploads)
        .nest_service("/static", statics)

        // Add state
        .with_state(state)

        // Add middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;
    use std::sync::Arc;

    use axum::body::{Body, Bytes};
    use axum::http::{Request, Response};
    use axum::Router;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use leaf_classifier::inference::decode_image;
    use leaf_classifier::{Classification, ComputeTarget, ImageClassifier, LabelSet, Result};

    use crate::state::{AppState, ServerConfig};

    /// Decodes for real but always answers "rust" at 91%
    pub struct StubClassifier {
        labels: LabelSet,
    }

    impl ImageClassifier for StubClassifier {
        fn classify(&self, bytes: &[u8]) -> Result<Classification> {
            let image = decode_image(bytes)?;
            self.classify_image(&image)
        }

        fn classify_image(&self, _image: &DynamicImage) -> Result<Classification> {
            let probabilities = vec![0.01, 0.02, 0.01, 0.91, 0.02, 0.02, 0.01];
            Classification::from_probabilities(probabilities, &self.labels, 1.5)
        }

        fn labels(&self) -> &LabelSet {
            &self.labels
        }

        fn target(&self) -> ComputeTarget {
            ComputeTarget::Cpu
        }
    }

    /// Router over a stub classifier with upload/static dirs in a temp dir
    pub fn test_app() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let upload_dir = dir.path().join("uploads");
        std::fs::create_dir_all(&upload_dir).unwrap();

        let config = ServerConfig {
            upload_dir,
            static_dir: dir.path().join("static"),
            ..ServerConfig::default()
        };
        let classifier = Arc::new(StubClassifier {
            labels: LabelSet::default(),
        });
        let state = Arc::new(AppState::new(config, classifier));
        (super::router(state), dir)
    }

    pub fn png_bytes() -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, Rgb([40, 160, 60])));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    pub fn multipart_request(uri: &str, field: &str, file_name: &str, data: &[u8]) -> Request<Body> {
        let boundary = "leafclassifierboundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    pub async fn get(app: Router, uri: &str) -> Response<Body> {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.oneshot(request).await.unwrap()
    }

    pub async fn read_body(response: Response<Body>) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }
}
