//! Moodle web-service client (`webservice/rest/server.php`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};

use crate::{errors::Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SiteInfo {
    #[serde(default)]
    pub sitename: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub lang: String,
    pub userid: i64,
    #[serde(default)]
    pub siteurl: String,
    #[serde(default)]
    pub release: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Course {
    pub id: i64,
    #[serde(default)]
    pub shortname: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub completed: Option<bool>,
}

#[async_trait]
pub trait MoodleClient: Send + Sync {
    async fn site_info(&self, token: &str) -> Result<SiteInfo>;
    async fn courses(&self, token: &str, moodle_user_id: i64) -> Result<Vec<Course>>;
}

#[derive(Clone, Debug)]
pub struct HttpMoodleClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpMoodleClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::External(format!("moodle client build error: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        token: &str,
        function: &str,
        extra: &[(&str, String)],
    ) -> Result<T> {
        let mut query: Vec<(&str, String)> = vec![
            ("wstoken", token.to_string()),
            ("wsfunction", function.to_string()),
            ("moodlewsrestformat", "json".to_string()),
        ];
        query.extend(extra.iter().cloned());

        let resp = self
            .http
            .get(format!("{}/webservice/rest/server.php", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::External(format!("moodle request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("moodle body error: {e}")))?;
        if !status.is_success() {
            return Err(Error::External(format!(
                "moodle {function} failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        decode(function, &body)
    }
}

/// Moodle answers errors with HTTP 200 and an `exception` object.
fn decode<T: DeserializeOwned>(function: &str, body: &str) -> Result<T> {
    let v: serde_json::Value = serde_json::from_str(body)?;
    if let Some(obj) = v.as_object() {
        if obj.contains_key("exception") || obj.contains_key("errorcode") {
            let code = obj.get("errorcode").and_then(|c| c.as_str()).unwrap_or("unknown");
            let message = obj.get("message").and_then(|m| m.as_str()).unwrap_or("");
            return Err(Error::External(format!(
                "moodle {function} error {code}: {message}"
            )));
        }
    }
    Ok(serde_json::from_value(v)?)
}

#[async_trait]
impl MoodleClient for HttpMoodleClient {
    async fn site_info(&self, token: &str) -> Result<SiteInfo> {
        self.call(token, "core_webservice_get_site_info", &[]).await
    }

    async fn courses(&self, token: &str, moodle_user_id: i64) -> Result<Vec<Course>> {
        self.call(
            token,
            "core_enrol_get_users_courses",
            &[("userid", moodle_user_id.to_string())],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_site_info() {
        let info: SiteInfo = decode(
            "core_webservice_get_site_info",
            r#"{"sitename":"Campus","username":"ann","fullname":"Ann Lee","userid":42,"functions":[]}"#,
        )
        .unwrap();
        assert_eq!(info.userid, 42);
        assert_eq!(info.sitename, "Campus");
    }

    #[test]
    fn exception_payload_is_an_error() {
        let err = decode::<SiteInfo>(
            "core_webservice_get_site_info",
            r#"{"exception":"moodle_exception","errorcode":"invalidtoken","message":"Invalid token"}"#,
        )
        .unwrap_err();
        match err {
            Error::External(msg) => assert!(msg.contains("invalidtoken")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_course_list() {
        let courses: Vec<Course> = decode(
            "core_enrol_get_users_courses",
            r#"[{"id":1,"shortname":"MATH","fullname":"Calculus","progress":null},{"id":2,"fullname":"Physics","progress":37.5}]"#,
        )
        .unwrap();
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[1].progress, Some(37.5));
    }
}
