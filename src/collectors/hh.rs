use async_trait::async_trait;

use crate::collectors::{Page, PageBody, PageSource};
use crate::error::FetchError;

pub const DEFAULT_API_URL: &str = "https://api.hh.ru/";
pub const DEFAULT_USER_AGENT: &str = "vacancy-ingest/0.1";

/// Client for the hh.ru vacancy search endpoint.
pub struct HhClient {
    client: reqwest::Client,
    vacancies_url: String,
}

impl HhClient {
    /// hh.ru rejects requests without a descriptive `User-Agent`.
    pub fn new(api_url: &str, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            vacancies_url: format!("{}/vacancies", api_url.trim_end_matches('/')),
        })
    }

    pub fn vacancies_url(&self) -> &str {
        &self.vacancies_url
    }
}

#[async_trait]
impl PageSource for HhClient {
    async fn fetch_page(
        &self,
        employer_id: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Page, FetchError> {
        let mut request = self.client.get(&self.vacancies_url);
        if let Some(employer_id) = employer_id {
            request = request.query(&[("employer_id", employer_id)]);
        }
        let resp = request
            .query(&[("page", page), ("per_page", per_page)])
            .header("Accept", "application/json")
            .send()
            .await?;

        // Anything but 200, including other 2xx codes, ends pagination.
        if resp.status() != reqwest::StatusCode::OK {
            let status = resp.status().as_u16();
            tracing::warn!(
                employer_id = employer_id.unwrap_or("-"),
                page,
                status,
                "Vacancy page request failed"
            );
            return Err(FetchError::Transport { status });
        }

        let bytes = resp.bytes().await?;
        let body: PageBody = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            employer_id = employer_id.unwrap_or("-"),
            page,
            items = body.items.len(),
            "Fetched vacancy page"
        );

        Ok(Page::new(body.items, per_page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_vacancies_url_with_or_without_trailing_slash() {
        let client = HhClient::new(DEFAULT_API_URL, DEFAULT_USER_AGENT).unwrap();
        assert_eq!(client.vacancies_url(), "https://api.hh.ru/vacancies");

        let client = HhClient::new("http://127.0.0.1:9000", DEFAULT_USER_AGENT).unwrap();
        assert_eq!(client.vacancies_url(), "http://127.0.0.1:9000/vacancies");
    }
}
