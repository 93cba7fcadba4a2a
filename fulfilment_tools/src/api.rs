use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::FulfilmentConfig,
    data_objects::{CreatedLabel, EmailRequest, EmailSendResult, LabelRequest},
    FulfilmentApiError,
};

/// A JSON REST client bound to a base URL, with a request timeout and default headers.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    client: Arc<Client>,
    basic_auth: Option<(String, String)>,
}

impl RestClient {
    pub fn new(
        base_url: &str,
        headers: HeaderMap,
        basic_auth: Option<(String, String)>,
        config: &FulfilmentConfig,
    ) -> Result<Self, FulfilmentApiError> {
        let mut headers = headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FulfilmentApiError::Initialization(e.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self { base_url, client: Arc::new(client), basic_auth })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, FulfilmentApiError> {
        let url = self.url(path);
        trace!("Sending REST query: {method} {url}");
        let mut req = self.client.request(method, url);
        if let Some((user, password)) = &self.basic_auth {
            req = req.basic_auth(user, Some(password));
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| FulfilmentApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await?;
            Err(FulfilmentApiError::QueryError { status, message })
        }
    }
}

//--------------------------------------       EmailApi        ---------------------------------------------------------
#[derive(Clone)]
pub struct EmailApi {
    from: String,
    rest: RestClient,
}

impl EmailApi {
    pub fn new(config: &FulfilmentConfig) -> Result<Self, FulfilmentApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = format!("Bearer {}", config.email_api_key.reveal());
        let val = HeaderValue::from_str(&bearer).map_err(|e| FulfilmentApiError::Initialization(e.to_string()))?;
        headers.insert(AUTHORIZATION, val);
        let rest = RestClient::new(&config.email_api_url, headers, None, config)?;
        Ok(Self { from: config.email_from.clone(), rest })
    }

    /// Sends a templated email. A `success: false` answer from the service is returned as
    /// [`FulfilmentApiError::Rejected`]. On success, the service's message id is returned, if it supplied one.
    pub async fn send(
        &self,
        template: &str,
        recipient: &str,
        context: Value,
    ) -> Result<Option<String>, FulfilmentApiError> {
        let request = EmailRequest {
            template: template.to_string(),
            from: self.from.clone(),
            to: recipient.to_string(),
            context,
        };
        debug!("Sending '{template}' email to {recipient}");
        let result = self.rest.rest_query::<EmailSendResult, _>(Method::POST, "/emails", Some(request)).await?;
        let id = result.into_result()?;
        info!("'{template}' email accepted for delivery. Message id: {}", id.as_deref().unwrap_or("n/a"));
        Ok(id)
    }
}

//--------------------------------------       LabelApi        ---------------------------------------------------------
#[derive(Clone)]
pub struct LabelApi {
    rest: RestClient,
}

impl LabelApi {
    pub fn new(config: &FulfilmentConfig) -> Result<Self, FulfilmentApiError> {
        let auth = (config.label_api_key.reveal().clone(), config.label_api_secret.reveal().clone());
        let rest = RestClient::new(&config.label_api_url, HeaderMap::new(), Some(auth), config)?;
        Ok(Self { rest })
    }

    /// Announces a return parcel to the courier and returns the prepaid label.
    pub async fn create_label(&self, request: LabelRequest) -> Result<CreatedLabel, FulfilmentApiError> {
        #[derive(Deserialize)]
        struct LabelResponse {
            label: CreatedLabel,
        }
        debug!("Requesting return label for {}", request.reference);
        let reference = request.reference.clone();
        let result = self.rest.rest_query::<LabelResponse, _>(Method::POST, "/labels", Some(request)).await?;
        info!(
            "Return label created for {reference}. Parcel {} tracking {}",
            result.label.parcel_id, result.label.tracking_number
        );
        Ok(result.label)
    }
}
