use log::{debug, info};

use super::client::{BuildkiteClient, BuildsQuery};
use super::types::Build;
use crate::error::Result;

impl BuildkiteClient {
    /// Fetches every build matching `query`, following `rel="next"` links
    /// until the server stops returning one.
    ///
    /// Pages are concatenated in the order the server returns them. There is
    /// no page limit: the link chain ending is the only stop condition.
    ///
    /// # Errors
    ///
    /// Returns the first page error encountered. Builds from earlier pages are
    /// discarded, since partial data would skew the aggregated counts.
    pub async fn fetch_builds(&self, org: &str, query: &BuildsQuery) -> Result<Vec<Build>> {
        let mut all_builds = Vec::new();
        let mut next = Some(self.builds_url(org, query)?);
        let mut pages = 0usize;

        while let Some(url) = next {
            debug!("Requesting {url}");
            let page = self.fetch_page(&url).await?;
            pages += 1;
            all_builds.extend(page.builds);
            next = page.next;
        }

        info!(
            "Fetched {} builds across {pages} page(s) for org {org}",
            all_builds.len()
        );

        Ok(all_builds)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::{Matcher, Server, ServerGuard};

    use super::*;
    use crate::auth::Token;
    use crate::error::MetricsError;
    use crate::providers::buildkite::types::State;

    fn client(server: &ServerGuard) -> BuildkiteClient {
        BuildkiteClient::new(&server.url(), Token::from("t"), Duration::from_secs(5)).unwrap()
    }

    fn page_body(ids: &[&str]) -> String {
        let builds: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({"id": id, "state": "running", "jobs": []}))
            .collect();
        serde_json::Value::Array(builds).to_string()
    }

    fn link_to(server: &ServerGuard, page: u32) -> String {
        format!(
            r#"<{}/organizations/acme/builds?page={page}&per_page=100>; rel="next""#,
            server.url()
        )
    }

    fn page_matcher(page: &str) -> Matcher {
        Matcher::UrlEncoded("page".into(), page.into())
    }

    #[tokio::test]
    async fn concatenates_linked_pages_in_order() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/organizations/acme/builds")
            .match_query(page_matcher("1"))
            .with_header("link", &link_to(&server, 2))
            .with_body(page_body(&["a", "b"]))
            .create_async()
            .await;
        let second = server
            .mock("GET", "/organizations/acme/builds")
            .match_query(page_matcher("2"))
            .with_header("link", &link_to(&server, 3))
            .with_body(page_body(&["c"]))
            .create_async()
            .await;
        let third = server
            .mock("GET", "/organizations/acme/builds")
            .match_query(page_matcher("3"))
            .with_header(
                "link",
                &format!(r#"<{}/organizations/acme/builds?page=1>; rel="first""#, server.url()),
            )
            .with_body(page_body(&["d", "e"]))
            .create_async()
            .await;

        let builds = client(&server)
            .fetch_builds("acme", &BuildsQuery::default())
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        third.assert_async().await;
        let ids: Vec<_> = builds.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn returns_single_page_without_next_relation() {
        let mut server = Server::new_async().await;
        let only = server
            .mock("GET", "/organizations/acme/builds")
            .match_query(Matcher::Any)
            .with_body(page_body(&["a", "b", "c"]))
            .expect(1)
            .create_async()
            .await;

        let builds = client(&server)
            .fetch_builds("acme", &BuildsQuery::default())
            .await
            .unwrap();

        only.assert_async().await;
        assert_eq!(builds.len(), 3);
    }

    #[tokio::test]
    async fn forwards_state_filter() {
        let mut server = Server::new_async().await;
        let scheduled = server
            .mock("GET", "/organizations/acme/builds")
            .match_query(Matcher::AllOf(vec![
                page_matcher("1"),
                Matcher::UrlEncoded("state".into(), "scheduled".into()),
            ]))
            .with_body("[]")
            .create_async()
            .await;

        let builds = client(&server)
            .fetch_builds("acme", &BuildsQuery::in_state(State::Scheduled))
            .await
            .unwrap();

        scheduled.assert_async().await;
        assert!(builds.is_empty());
    }

    #[tokio::test]
    async fn aborts_on_mid_traversal_failure() {
        let mut server = Server::new_async().await;
        let _first = server
            .mock("GET", "/organizations/acme/builds")
            .match_query(page_matcher("1"))
            .with_header("link", &link_to(&server, 2))
            .with_body(page_body(&["a"]))
            .create_async()
            .await;
        let _second = server
            .mock("GET", "/organizations/acme/builds")
            .match_query(page_matcher("2"))
            .with_status(502)
            .create_async()
            .await;

        let err = client(&server)
            .fetch_builds("acme", &BuildsQuery::default())
            .await
            .unwrap_err();

        match err {
            MetricsError::Fetch { url, status } => {
                assert_eq!(status, 502);
                assert!(url.contains("page=2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
