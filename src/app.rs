/// Explorer session: one page, the transport client and the module UI registry
use std::sync::{Arc, Mutex};

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::annotation::{draw_image_with_rotating_bounding_box, show_results_bounding_boxes, FrameOverlayHandle};
use crate::config::Config;
use crate::module_ui::{ModuleUiRegistry, UiSource};
use crate::page::Page;
use crate::prediction::ModuleResponse;
use crate::results::{display_base_results, show_prediction_summary, show_results_image_data};
use crate::transport::{Backend, FilePart, TransportClient, TransportError};

pub struct Explorer {
    config: Config,
    page: Arc<Mutex<Page>>,
    transport: Arc<TransportClient>,
    registry: Arc<ModuleUiRegistry>,
}

impl Explorer {
    /// Explorer talking to `config.server_url` over HTTP
    pub fn new(config: Config) -> Result<Self, String> {
        let page = Arc::new(Mutex::new(Page::explorer_layout()));
        let transport = TransportClient::from_config(&config, Arc::clone(&page))?;
        Ok(Self::assemble(config, page, transport))
    }

    pub fn with_backend(config: Config, backend: Arc<dyn Backend>) -> Self {
        let page = Arc::new(Mutex::new(Page::explorer_layout()));
        let transport = TransportClient::new(backend, &config.server_url, config.request_timeout, Arc::clone(&page));
        Self::assemble(config, page, transport)
    }

    fn assemble(config: Config, page: Arc<Mutex<Page>>, transport: TransportClient) -> Self {
        let transport = Arc::new(transport);
        let registry = Arc::new(ModuleUiRegistry::new(
            Arc::clone(&transport),
            UiSource::from_flag(config.ui_from_server),
            config.pinned_tabs.clone(),
        ));
        debug!("Explorer for {} ({:?})", config.server_url, registry.source());

        Self { config, page, transport, registry }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn page(&self) -> &Arc<Mutex<Page>> {
        &self.page
    }

    pub fn transport(&self) -> &Arc<TransportClient> {
        &self.transport
    }

    pub fn registry(&self) -> &Arc<ModuleUiRegistry> {
        &self.registry
    }

    /// Runs an image module and shows what it returned: the prediction summary, and
    /// the boxes over the returned image or over the image already on the page.
    /// Failures go to the baseline results display.
    pub async fn process_image(
        &self,
        route: &str,
        operation: &str,
        files: Vec<FilePart>,
        fields: Vec<(String, String)>,
    ) -> Result<ModuleResponse, TransportError> {
        let outcome = self.transport.submit(route, operation, files, fields).await;
        let sort = self.config.sort_by_confidence;
        let mut page = self.page.lock().unwrap();

        match &outcome {
            Ok(data) => {
                info!("{} predictions from {}", data.predictions().len(),
                    data.module_id.as_deref().unwrap_or(route));
                show_prediction_summary(&mut page, Some(data), sort);
                if data.image_base64.is_some() {
                    show_results_image_data(&mut page, data, sort);
                } else {
                    show_results_bounding_boxes(&mut page, data.predictions(), sort);
                }
            }
            Err(TransportError::Rejected(data)) => display_base_results(&mut page, Some(data.as_ref())),
            Err(_) => display_base_results(&mut page, None),
        }

        outcome
    }

    pub fn start_polling(&self, cancel: CancellationToken) -> JoinHandle<()> {
        info!("Polling module list every {:?}", self.config.poll_interval);
        Arc::clone(&self.registry).run(self.config.poll_interval, cancel)
    }

    /// Animated frame around `[left, top, right, bottom]` over the result image
    pub fn draw_rotating_box(&self, image_src: &str, bbox: [f64; 4]) -> Result<FrameOverlayHandle, String> {
        draw_image_with_rotating_bounding_box(&self.page, image_src, bbox, &self.config)
    }

    pub fn snapshot_html(&self) -> String {
        self.page.lock().unwrap().to_html()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use crate::page::ImageElement;
    use crate::transport::{MultipartPayload, RawResponse};

    struct FixedBackend {
        body: String,
    }

    impl Backend for FixedBackend {
        fn post_multipart<'a>(&'a self, _url: &'a str, _payload: MultipartPayload) -> BoxFuture<'a, Result<RawResponse, String>> {
            Box::pin(async move { Ok(RawResponse { status: 200, body: self.body.clone() }) })
        }

        fn get<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<RawResponse, String>> {
            Box::pin(async move { Ok(RawResponse { status: 200, body: self.body.clone() }) })
        }
    }

    fn explorer(body: &str) -> Explorer {
        Explorer::with_backend(Config::default(), Arc::new(FixedBackend { body: body.to_string() }))
    }

    #[tokio::test]
    async fn test_successful_detection_is_rendered() {
        let explorer = explorer(r#"{
            "success": true,
            "moduleId": "ObjectDetectionYOLOv8",
            "inferenceMs": 25,
            "predictions": [
                {"label": "cat", "confidence": 0.55, "x_min": 10, "y_min": 10, "x_max": 100, "y_max": 100},
                {"label": "dog", "confidence": 0.95, "x_min": 200, "y_min": 50, "x_max": 120, "y_max": 150}
            ]
        }"#);
        explorer.page().lock().unwrap().preview_image =
            Some(ImageElement::new("blob:preview", 320.0, 240.0, 640.0, 480.0));

        let data = explorer.process_image("vision", "detection", vec![], vec![]).await.unwrap();
        assert_eq!(data.predictions().len(), 2);

        let page = explorer.page().lock().unwrap();
        assert!(page.results_html().contains("<tr><td>0</td><td>dog</td><td>95%</td></tr>"));
        assert!(page.results_html().contains("<tr><td>Inference</td><td>25 ms</td></tr>"));
        assert!(page.mask.visible);
        assert!(!page.preview_image.as_ref().unwrap().visible);
    }

    #[tokio::test]
    async fn test_rejected_call_shows_base_results() {
        let explorer = explorer(r#"{"success": false, "message": "No face found"}"#);
        let err = explorer.process_image("vision", "face", vec![], vec![]).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));

        let page = explorer.page().lock().unwrap();
        assert_eq!(page.results_html(), "Operation failed<div>No face found</div><table class='timing-table'></table>");
    }

    #[tokio::test]
    async fn test_poll_populates_snapshot() {
        let explorer = explorer(r#"{"modules": [{
            "moduleId": "SceneClassifier",
            "name": "Scene Classification",
            "category": "Computer Vision",
            "queue": "scene_queue",
            "explorerUI": {"html": "<div id='_MID_out'></div>", "script": "let _MID_x = 1;", "css": ""}
        }]}"#);

        explorer.registry().poll_once().await;
        let html = explorer.snapshot_html();
        assert!(html.contains("data-moduleid=\"SceneClassifier\""));
        assert!(html.contains("<div id='SceneClassifier_out'></div>"));
        assert!(html.contains("<script id=\"script_SceneClassifier\">let SceneClassifier_x = 1;</script>"));
        assert!(html.contains("class=\"nav-item active\" data-category=\"Computer Vision\""));
    }
}
