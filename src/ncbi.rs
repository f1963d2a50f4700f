use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::SraAccession;
use crate::error::KiraError;
use crate::poll::{PollResponse, PollTransport};
use crate::resolver::SuggestClient;
use crate::submit::SessionCookie;

pub const AUTOCOMPLETE_URL: &str = "https://blast.ncbi.nlm.nih.gov/portal/utils/autocomp.fcgi";
pub const BLAST_URL: &str = "https://blast.ncbi.nlm.nih.gov/Blast.cgi";

/// Product user agent shared by the HTTP client and the browser session.
pub fn user_agent() -> String {
    format!(
        "KiraSraBlast/{} (X11; Linux x86_64)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Plain HTTP side of NCBI BLAST: accession suggestions and job polling.
#[derive(Clone)]
pub struct NcbiBlastClient {
    client: Client,
}

impl NcbiBlastClient {
    pub fn new(proxy: Option<&str>) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent())
                .map_err(|err| KiraError::BlastHttp(err.to_string()))?,
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120));
        if let Some(proxy) = proxy {
            let proxy =
                reqwest::Proxy::all(proxy).map_err(|err| KiraError::BlastHttp(err.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|err| KiraError::BlastHttp(err.to_string()))?;

        Ok(Self { client })
    }
}

impl SuggestClient for NcbiBlastClient {
    fn suggest(&self, accession: &SraAccession) -> Result<String, KiraError> {
        let response = self
            .client
            .get(AUTOCOMPLETE_URL)
            .query(&[("dict", "srx_dict_sg"), ("q", accession.as_str())])
            .timeout(Duration::from_secs(60))
            .send()
            .map_err(|err| KiraError::LookupHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "accession lookup failed".to_string());
            return Err(KiraError::LookupStatus { status, message });
        }
        response
            .text()
            .map_err(|err| KiraError::LookupHttp(err.to_string()))
    }
}

impl PollTransport for NcbiBlastClient {
    fn get(
        &self,
        params: &[(&'static str, String)],
        cookies: &[SessionCookie],
    ) -> Result<PollResponse, KiraError> {
        let mut request = self.client.get(BLAST_URL).query(params);
        if !cookies.is_empty() {
            let header = cookie_header(cookies);
            let value =
                HeaderValue::from_str(&header).map_err(|err| KiraError::BlastHttp(err.to_string()))?;
            request = request.header(COOKIE, value);
        }
        let response = request
            .send()
            .map_err(|err| KiraError::BlastHttp(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| KiraError::BlastHttp(err.to_string()))?;
        Ok(PollResponse { status, body })
    }
}

pub fn cookie_header(cookies: &[SessionCookie]) -> String {
    cookies
        .iter()
        .map(|cookie| format!("{}={}", cookie.name, cookie.value))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookies_join_into_one_header() {
        let cookies = vec![
            SessionCookie {
                name: "ncbi_sid".to_string(),
                value: "ABC".to_string(),
            },
            SessionCookie {
                name: "WebEnv".to_string(),
                value: "1xyz".to_string(),
            },
        ];
        assert_eq!(cookie_header(&cookies), "ncbi_sid=ABC; WebEnv=1xyz");
    }

    #[test]
    fn user_agent_names_product() {
        assert!(user_agent().starts_with("KiraSraBlast/"));
    }
}
