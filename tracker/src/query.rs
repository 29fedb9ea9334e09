use crate::auth::BearerToken;
use crate::errors::QueryError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use std::num::NonZeroU32;

/// What the operator asked to see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameters {
    pub device_id: String,
    pub result_limit: NonZeroU32,
    /// Epoch milliseconds; 0 means no upper bound
    pub upper_bound: u64,
}

impl QueryParameters {
    pub fn new(device_id: impl Into<String>, result_limit: NonZeroU32) -> Self {
        Self {
            device_id: device_id.into(),
            result_limit,
            upper_bound: 0,
        }
    }
}

/// Fully qualified GET request for one page of a device track
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub url: Url,
    pub headers: HeaderMap,
}

/// Maps query parameters onto the track endpoint. Pure.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    endpoint: Url,
}

impl QueryBuilder {
    pub fn new(endpoint: &str) -> Result<Self, QueryError> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| QueryError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(QueryError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Self { endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn build(
        &self,
        params: &QueryParameters,
        token: &BearerToken,
    ) -> Result<RequestDescriptor, QueryError> {
        if params.device_id.is_empty() {
            return Err(QueryError::EmptyDeviceId);
        }

        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("imsi", &params.device_id)
                .append_pair("sort", "desc")
                .append_pair("limit", &params.result_limit.to_string());
            // An absent bound means "no filter"; never send to=0
            if params.upper_bound != 0 {
                query.append_pair("to", &params.upper_bound.to_string());
            }
        }

        let mut value = HeaderValue::from_str(token.as_str()).map_err(|_| QueryError::InvalidToken)?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);

        Ok(RequestDescriptor { url, headers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "https://abc123.execute-api.us-west-2.amazonaws.com/v1/gps-data";

    fn params(limit: u32, upper_bound: u64) -> QueryParameters {
        QueryParameters {
            device_id: "440103123456789".to_string(),
            result_limit: NonZeroU32::new(limit).unwrap(),
            upper_bound,
        }
    }

    #[test]
    fn test_build_without_upper_bound() {
        let builder = QueryBuilder::new(ENDPOINT).unwrap();
        let request = builder
            .build(&params(10, 0), &BearerToken::new("pass12345!"))
            .unwrap();

        assert_eq!(
            request.url.as_str(),
            "https://abc123.execute-api.us-west-2.amazonaws.com/v1/gps-data?imsi=440103123456789&sort=desc&limit=10"
        );
        assert!(!request.url.query_pairs().any(|(key, _)| key == "to"));
        assert_eq!(request.headers[AUTHORIZATION], "pass12345!");
    }

    #[test]
    fn test_build_with_upper_bound() {
        let builder = QueryBuilder::new(ENDPOINT).unwrap();
        let request = builder
            .build(&params(100, 1590759773000), &BearerToken::new("t"))
            .unwrap();

        let to: Vec<_> = request
            .url
            .query_pairs()
            .filter(|(key, _)| key == "to")
            .map(|(_, value)| value.into_owned())
            .collect();
        assert_eq!(to, vec!["1590759773000".to_string()]);
    }

    #[test]
    fn test_build_is_idempotent() {
        let builder = QueryBuilder::new(ENDPOINT).unwrap();
        let token = BearerToken::new("t");
        let first = builder.build(&params(1, 42), &token).unwrap();
        let second = builder.build(&params(1, 42), &token).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_device_id_is_encoded() {
        let builder = QueryBuilder::new(ENDPOINT).unwrap();
        let mut p = params(1, 0);
        p.device_id = "dev 1&x".to_string();
        let request = builder.build(&p, &BearerToken::new("t")).unwrap();

        let imsi = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "imsi")
            .map(|(_, value)| value.into_owned());
        assert_eq!(imsi.as_deref(), Some("dev 1&x"));
    }

    #[test]
    fn test_empty_device_id() {
        let builder = QueryBuilder::new(ENDPOINT).unwrap();
        let mut p = params(10, 0);
        p.device_id.clear();
        assert_eq!(
            builder.build(&p, &BearerToken::new("t")),
            Err(QueryError::EmptyDeviceId)
        );
    }

    #[test]
    fn test_invalid_token() {
        let builder = QueryBuilder::new(ENDPOINT).unwrap();
        assert_eq!(
            builder.build(&params(10, 0), &BearerToken::new("bad\ntoken")),
            Err(QueryError::InvalidToken)
        );
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(QueryBuilder::new("not a url").is_err());
        assert!(QueryBuilder::new("mailto:ops@example.com").is_err());
    }
}
