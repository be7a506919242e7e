//! REST client for the non-streaming endpoints.

use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::http::{ByteStream, HttpTransport, ReqwestTransport};
use crate::schemas::*;

const MSGPACK: (&str, &str) = ("content-type", "application/msgpack");

/// Typed wrapper over an [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct Session<T = ReqwestTransport> {
    transport: T,
}

impl Session<ReqwestTransport> {
    /// Creates a session that talks HTTP through `reqwest`.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        Ok(Self::with_transport(ReqwestTransport::new(config)?))
    }
}

impl<T: HttpTransport> Session<T> {
    /// Creates a session over a custom transport.
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Synthesizes `request.text` in one call, streaming the audio back.
    pub async fn tts(&self, request: &TtsRequest) -> Result<ByteStream, Error> {
        let body = rmp_serde::to_vec_named(request)?;
        debug!(text_len = request.text.len(), "TTS request");
        self.transport
            .stream_request(Method::POST, "/v1/tts", Some(body), &[MSGPACK])
            .await
    }

    /// Transcribes `request.audio`.
    pub async fn asr(&self, request: &AsrRequest) -> Result<AsrResponse, Error> {
        let body = rmp_serde::to_vec_named(request)?;
        debug!(audio_len = request.audio.len(), "ASR request");
        self.json(Method::POST, "/v1/asr", Some(body), &[MSGPACK]).await
    }

    /// Lists models matching `params`.
    pub async fn list_models(
        &self,
        params: &ListModelsParams,
    ) -> Result<PaginatedResponse<ModelEntity>, Error> {
        let path = format!("/model?{}", params.to_query());
        self.json(Method::GET, &path, None, &[]).await
    }

    /// Fetches one model by id.
    pub async fn get_model(&self, model_id: &str) -> Result<ModelEntity, Error> {
        self.json(Method::GET, &format!("/model/{model_id}"), None, &[])
            .await
    }

    /// Creates a voice model from uploaded samples.
    pub async fn create_model(&self, params: &CreateModelParams) -> Result<ModelEntity, Error> {
        debug!(title = %params.title, voices = params.voices.len(), "Creating model");
        let bytes = self
            .transport
            .multipart_request(Method::POST, "/model", params.to_form())
            .await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Updates the set fields of a model.
    pub async fn update_model(&self, model_id: &str, params: &UpdateModelParams) -> Result<(), Error> {
        self.transport
            .multipart_request(Method::PATCH, &format!("/model/{model_id}"), params.to_form())
            .await?;
        Ok(())
    }

    /// Deletes a model.
    pub async fn delete_model(&self, model_id: &str) -> Result<(), Error> {
        self.transport
            .request(Method::DELETE, &format!("/model/{model_id}"), None, &[])
            .await?;
        Ok(())
    }

    /// Returns the remaining API credit.
    pub async fn get_api_credit(&self) -> Result<ApiCreditEntity, Error> {
        self.json(Method::GET, "/wallet/self/api-credit", None, &[])
            .await
    }

    /// Returns the current package.
    pub async fn get_package(&self) -> Result<PackageEntity, Error> {
        self.json(Method::GET, "/wallet/self/package", None, &[])
            .await
    }

    async fn json<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        headers: &[(&str, &str)],
    ) -> Result<R, Error> {
        let bytes = self.transport.request(method, path, body, headers).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{FormPart, MultipartForm};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Recorded {
        method: Method,
        path: String,
        body: Option<Vec<u8>>,
        headers: Vec<(String, String)>,
    }

    #[derive(Default)]
    struct MockTransport {
        calls: Mutex<Vec<Recorded>>,
        forms: Mutex<Vec<MultipartForm>>,
        responses: Mutex<VecDeque<Result<Vec<u8>, Error>>>,
    }

    impl MockTransport {
        fn respond(self, response: Result<Vec<u8>, Error>) -> Self {
            self.responses.lock().unwrap().push_back(response);
            self
        }

        fn record(&self, method: Method, path: &str, body: Option<Vec<u8>>, headers: &[(&str, &str)]) {
            self.calls.lock().unwrap().push(Recorded {
                method,
                path: path.to_string(),
                body,
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });
        }

        fn next_response(&self) -> Result<Vec<u8>, Error> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        fn calls(&self) -> Vec<Recorded> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn request(
            &self,
            method: Method,
            path: &str,
            body: Option<Vec<u8>>,
            headers: &[(&str, &str)],
        ) -> Result<Vec<u8>, Error> {
            self.record(method, path, body, headers);
            self.next_response()
        }

        async fn stream_request(
            &self,
            method: Method,
            path: &str,
            body: Option<Vec<u8>>,
            headers: &[(&str, &str)],
        ) -> Result<ByteStream, Error> {
            self.record(method, path, body, headers);
            let data = self.next_response()?;
            let chunks: Vec<Result<Vec<u8>, Error>> =
                data.chunks(4).map(|c| Ok(c.to_vec())).collect();
            Ok(Box::pin(futures_util::stream::iter(chunks)))
        }

        async fn multipart_request(
            &self,
            method: Method,
            path: &str,
            form: MultipartForm,
        ) -> Result<Vec<u8>, Error> {
            self.record(method, path, None, &[]);
            self.forms.lock().unwrap().push(form);
            self.next_response()
        }
    }

    #[tokio::test]
    async fn test_tts_posts_msgpack_and_streams() {
        let session = Session::with_transport(MockTransport::default().respond(Ok(vec![1; 10])));

        let request = TtsRequest::new("Hello, world!");
        let mut stream = session.tts(&request).await.unwrap();
        let mut total = 0;
        while let Some(chunk) = stream.next().await {
            total += chunk.unwrap().len();
        }
        assert_eq!(total, 10);

        let calls = session.transport().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::POST);
        assert_eq!(calls[0].path, "/v1/tts");
        assert_eq!(
            calls[0].headers,
            vec![("content-type".to_string(), "application/msgpack".to_string())]
        );
        let sent: TtsRequest = rmp_serde::from_slice(calls[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(sent, request);
    }

    #[tokio::test]
    async fn test_asr_parses_json() {
        let body = br#"{"text":"hi there","duration":1250.0,"segments":[{"text":"hi there","start":0.0,"end":1.25}]}"#;
        let session = Session::with_transport(MockTransport::default().respond(Ok(body.to_vec())));

        let response = session
            .asr(&AsrRequest::new(vec![0; 16]))
            .await
            .unwrap();
        assert_eq!(response.text, "hi there");
        assert_eq!(response.segments.len(), 1);
        assert_eq!(session.transport().calls()[0].path, "/v1/asr");
    }

    #[tokio::test]
    async fn test_list_models_builds_query() {
        let session = Session::with_transport(
            MockTransport::default().respond(Ok(br#"{"total":0,"items":[]}"#.to_vec())),
        );

        let params = ListModelsParams {
            page_size: 5,
            sort_by: SortBy::CreatedAt,
            ..ListModelsParams::default()
        };
        let page = session.list_models(&params).await.unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(
            session.transport().calls()[0].path,
            "/model?page_size=5&page_number=1&sort_by=created_at"
        );
    }

    #[tokio::test]
    async fn test_wallet_endpoints() {
        let credit = br#"{"_id":"c","user_id":"u","credit":"3.50","created_at":"t","updated_at":"t"}"#;
        let package = br#"{"_id":"p","user_id":"u","type":"monthly","total":100,"balance":40,"created_at":"t","updated_at":"t","finished_at":null}"#;
        let session = Session::with_transport(
            MockTransport::default()
                .respond(Ok(credit.to_vec()))
                .respond(Ok(package.to_vec())),
        );

        assert_eq!(session.get_api_credit().await.unwrap().credit, "3.50");
        assert_eq!(session.get_package().await.unwrap().balance, 40);

        let paths: Vec<_> = session
            .transport()
            .calls()
            .into_iter()
            .map(|c| c.path)
            .collect();
        assert_eq!(paths, ["/wallet/self/api-credit", "/wallet/self/package"]);
    }

    #[tokio::test]
    async fn test_http_errors_pass_through() {
        let session = Session::with_transport(MockTransport::default().respond(Err(Error::Http {
            status: 404,
            message: "Model not found".to_string(),
        })));

        let err = session.get_model("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(session.transport().calls()[0].path, "/model/missing");
    }

    #[tokio::test]
    async fn test_create_model_posts_form() {
        let model = br#"{"_id":"m1","type":"tts","title":"My voice","description":"","cover_image":"","train_mode":"fast","state":"created","tags":[],"samples":[],"created_at":"t","updated_at":"t","languages":[],"visibility":"private","lock_visibility":false,"like_count":0,"mark_count":0,"shared_count":0,"task_count":0,"author":{"_id":"u1","nickname":"me","avatar":""}}"#;
        let session = Session::with_transport(MockTransport::default().respond(Ok(model.to_vec())));

        let mut params = CreateModelParams::new("My voice", vec![vec![1; 4]]);
        params.texts = vec!["hello".to_string()];
        let created = session.create_model(&params).await.unwrap();
        assert_eq!(created.id, "m1");

        let calls = session.transport().calls();
        assert_eq!(calls[0].method, Method::POST);
        assert_eq!(calls[0].path, "/model");
        let forms = session.transport().forms.lock().unwrap().clone();
        assert_eq!(forms, vec![params.to_form()]);
        assert!(matches!(&forms[0].parts()[0], (name, FormPart::File { .. }) if name == "voices"));
        assert_eq!(forms[0].text_value("texts"), Some("hello"));
    }

    #[tokio::test]
    async fn test_update_model_patches_form() {
        let session = Session::with_transport(MockTransport::default());

        let params = UpdateModelParams {
            description: Some("new".to_string()),
            tags: vec!["x".to_string(), "y".to_string()],
            ..UpdateModelParams::default()
        };
        session.update_model("m1", &params).await.unwrap();

        let calls = session.transport().calls();
        assert_eq!(calls[0].method, Method::PATCH);
        assert_eq!(calls[0].path, "/model/m1");
        let forms = session.transport().forms.lock().unwrap().clone();
        assert_eq!(forms[0].text_value("description"), Some("new"));
        assert_eq!(forms[0].parts().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_model_ignores_body() {
        let session = Session::with_transport(MockTransport::default());
        session.delete_model("m1").await.unwrap();

        let calls = session.transport().calls();
        assert_eq!(calls[0].method, Method::DELETE);
        assert_eq!(calls[0].path, "/model/m1");
    }

    #[tokio::test]
    async fn test_malformed_json_is_an_error() {
        let session = Session::with_transport(MockTransport::default().respond(Ok(b"nope".to_vec())));
        assert!(matches!(
            session.get_api_credit().await,
            Err(Error::Json(_))
        ));
    }
}
