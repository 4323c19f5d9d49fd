use hosting::prelude::*;
use mockito::Matcher;
use serde_json::json;

fn provider_for(server: &mockito::Server) -> GitHubProvider {
    let config = GitHubConfig::default().with_api_url(server.url());
    GitHubProvider::new(config, GitHubToken::new("ghp_test")).unwrap()
}

#[tokio::test]
async fn test_transfer_posts_new_owner_with_bearer_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/repos/BZZ-M319/m319-lb01-primes/transfer")
        .match_header("authorization", "Bearer ghp_test")
        .match_header("accept", "application/vnd.github+json")
        .match_body(Matcher::Json(json!({ "new_owner": "templates-python" })))
        .with_status(202)
        .with_body("{}")
        .create_async()
        .await;

    let provider = provider_for(&server);
    provider
        .transfer(
            &RepositoryRef::new("BZZ-M319", "m319-lb01-primes"),
            "templates-python",
        )
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_set_template_patches_flag() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PATCH", "/repos/templates-python/m319-lu06-a03-lists")
        .match_body(Matcher::Json(json!({ "is_template": true })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let provider = provider_for(&server);
    provider
        .set_template(&RepositoryRef::new("templates-python", "m319-lu06-a03-lists"))
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_create_and_delete() {
    let mut server = mockito::Server::new_async().await;
    let delete = server
        .mock("DELETE", "/repos/templates-python/m319-lu07-a02-listadd")
        .with_status(204)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/orgs/templates-python/repos")
        .match_body(Matcher::Json(json!({
            "name": "m319-lu07-a02-listadd",
            "private": false
        })))
        .with_status(201)
        .with_body("{}")
        .create_async()
        .await;

    let provider = provider_for(&server);
    let repo = RepositoryRef::new("templates-python", "m319-lu07-a02-listadd");
    provider.delete(&repo).await.unwrap();
    provider.create(&repo, Visibility::Public).await.unwrap();

    delete.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn test_list_follows_pagination_and_filters() {
    let mut server = mockito::Server::new_async().await;
    let next = format!("{}/organizations/42/repos?page=2", server.url());

    let first = server
        .mock("GET", "/orgs/templates-python/repos")
        .match_query(Matcher::UrlEncoded("per_page".into(), "100".into()))
        .with_status(200)
        .with_header("link", &format!(r#"<{}>; rel="next""#, next))
        .with_body(
            json!([
                { "name": "m323-lu01-a05-sum", "full_name": "templates-python/m323-lu01-a05-sum" },
                { "name": "m319-lu05-a02-larger", "full_name": "templates-python/m319-lu05-a02-larger" }
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let second = server
        .mock("GET", "/organizations/42/repos")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(200)
        .with_body(
            json!([
                { "name": "m323-lu06-a08-hashing", "full_name": "templates-python/m323-lu06-a08-hashing", "is_template": true }
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let provider = provider_for(&server);
    let repos = provider
        .list_repositories("templates-python", Some("323"))
        .await
        .unwrap();

    let names: Vec<&str> = repos.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["m323-lu01-a05-sum", "m323-lu06-a08-hashing"]);
    assert!(repos[1].is_template);

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_list_without_keyword_returns_everything() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/orgs/m323-ix22/repos")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!([
                { "name": "a", "full_name": "m323-ix22/a" },
                { "name": "b", "full_name": "m323-ix22/b" }
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let provider = provider_for(&server);
    let repos = provider.list_repositories("m323-ix22", None).await.unwrap();
    assert_eq!(repos.len(), 2);
}
