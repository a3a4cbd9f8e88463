use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use sysml_model_store::api::handlers::ModelStoreState;
use sysml_model_store::api::routes::build_app;
use sysml_model_store::store::MemoryStore;
use tokio::net::TcpListener;

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    /// Boot the router on an ephemeral port backed by a fresh in-memory store
    async fn spawn() -> Self {
        let state = ModelStoreState::new(MemoryStore::new(), 5);
        let app = build_app(state, Duration::from_secs(10));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            client: Client::new(),
            base_url: format!("http://{}", address),
        }
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(&format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
    }

    async fn post_with_key(
        &self,
        path: &str,
        key: &str,
        json: Value,
    ) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(&format!("{}{}", self.base_url, path))
            .header("Idempotency-Key", key)
            .json(&json)
            .send()
            .await
    }

    async fn put(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .put(&format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(&format!("{}{}", self.base_url, path))
            .send()
            .await
    }

    async fn get_json(&self, path: &str) -> Value {
        let response = self.get(path).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "GET {}", path);
        response.json().await.unwrap()
    }

    async fn create_project(&self, name: &str) -> Value {
        let response = self
            .post("/projects", json!({"@type": "Project", "name": name}))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.unwrap()
    }

    /// Commit payloads to the default branch and return the commit id
    async fn commit(&self, project_id: &str, payloads: Vec<Value>) -> String {
        let response = self
            .post(&format!("/projects/{}/commits", project_id), commit_body(payloads))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        body["@id"].as_str().unwrap().to_string()
    }
}

fn commit_body(payloads: Vec<Value>) -> Value {
    json!({
        "@type": "Commit",
        "change": payloads
            .into_iter()
            .map(|payload| json!({"@type": "DataVersion", "payload": payload}))
            .collect::<Vec<_>>()
    })
}

#[tokio::test]
async fn test_single_part_definition_round_trip() {
    let client = TestClient::spawn().await;

    println!("1. Creating project");
    let project = client.create_project("Test").await;
    let project_id = project["@id"].as_str().unwrap();
    assert!(project["defaultBranch"]["@id"].is_string());

    println!("2. Committing one PartDefinition");
    let commit_id = client
        .commit(
            project_id,
            vec![json!({"@type": "PartDefinition", "name": "BrakeSystem"})],
        )
        .await;

    println!("3. Listing the commit's elements");
    let elements = client
        .get_json(&format!("/projects/{}/commits/{}/elements", project_id, commit_id))
        .await;
    let elements = elements.as_array().unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0]["@type"], "PartDefinition");
    assert_eq!(elements[0]["name"], "BrakeSystem");
    assert!(elements[0]["@id"].is_string());
}

#[tokio::test]
async fn test_attributes_round_trip_verbatim() {
    let client = TestClient::spawn().await;
    let project = client.create_project("Verbatim").await;
    let project_id = project["@id"].as_str().unwrap();

    let payload = json!({
        "@type": "PartDefinition",
        "@id": "pedal",
        "name": "BrakePedal",
        "humanId": "PART-002",
        "general": [{"@id": "not-created-yet"}],
        "mass": {"value": 1.2, "unit": "kg"}
    });
    let commit_id = client.commit(project_id, vec![payload.clone()]).await;

    let element = client
        .get_json(&format!(
            "/projects/{}/commits/{}/elements/pedal",
            project_id, commit_id
        ))
        .await;
    assert_eq!(element, payload);

    // Repeated reads are identical
    let path = format!("/projects/{}/commits/{}/elements", project_id, commit_id);
    let first = client.get_json(&path).await;
    let second = client.get_json(&path).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_history_is_immutable_and_newest_first() {
    let client = TestClient::spawn().await;
    let project = client.create_project("History").await;
    let project_id = project["@id"].as_str().unwrap();
    let branch_id = project["defaultBranch"]["@id"].as_str().unwrap();

    let branch = client
        .get_json(&format!("/projects/{}/branches/{}", project_id, branch_id))
        .await;
    assert_eq!(branch["state"], "empty");
    assert!(branch["head"].is_null());

    let mut commit_ids = Vec::new();
    for name in ["Pedal", "Disc", "Caliper"] {
        commit_ids.push(
            client
                .commit(project_id, vec![json!({"@type": "PartDefinition", "name": name})])
                .await,
        );
    }

    let branch = client
        .get_json(&format!("/projects/{}/branches/{}", project_id, branch_id))
        .await;
    assert_eq!(branch["state"], "active");
    assert_eq!(branch["head"]["@id"], commit_ids[2].as_str());

    let commits = client
        .get_json(&format!("/projects/{}/commits", project_id))
        .await;
    let listed: Vec<&str> = commits
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["@id"].as_str().unwrap())
        .collect();
    assert_eq!(
        listed,
        vec![commit_ids[2].as_str(), commit_ids[1].as_str(), commit_ids[0].as_str()]
    );
    assert_eq!(commits[0]["previousCommit"]["@id"], commit_ids[1].as_str());
    assert!(commits[2]["previousCommit"].is_null());

    // Earlier commits keep their original delta
    let first = client
        .get_json(&format!(
            "/projects/{}/commits/{}/elements",
            project_id, commit_ids[0]
        ))
        .await;
    assert_eq!(first.as_array().unwrap().len(), 1);
    assert_eq!(first[0]["name"], "Pedal");

    let visible = client
        .get_json(&format!(
            "/projects/{}/commits/{}/elements?scope=visible",
            project_id, commit_ids[2]
        ))
        .await;
    assert_eq!(visible.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_invalid_batch_is_rejected_atomically() {
    let client = TestClient::spawn().await;
    let project = client.create_project("Atomic").await;
    let project_id = project["@id"].as_str().unwrap();

    let response = client
        .post(
            &format!("/projects/{}/commits", project_id),
            commit_body(vec![
                json!({"@type": "PartDefinition", "name": "A"}),
                json!({"@type": "PartDefinition", "name": "B"}),
                json!({"@type": "PartDefinition", "name": "C"}),
                json!({"@type": "HydraulicThing", "name": "D"}),
            ]),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UNKNOWN_TYPE");
    assert!(body["error"].as_str().unwrap().contains("HydraulicThing"));

    let commits = client
        .get_json(&format!("/projects/{}/commits", project_id))
        .await;
    assert!(commits.as_array().unwrap().is_empty());

    let response = client
        .post(
            &format!("/projects/{}/commits", project_id),
            commit_body(vec![json!({"@type": "Usage", "name": "Abstract"})]),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "ABSTRACT_TYPE");
}

#[tokio::test]
async fn test_identifier_reuse_follows_policy() {
    let client = TestClient::spawn().await;
    let project = client.create_project("Identity").await;
    let project_id = project["@id"].as_str().unwrap();
    let path = format!("/projects/{}/commits", project_id);

    client
        .commit(
            project_id,
            vec![json!({"@type": "RequirementDefinition", "@id": "req-1", "name": "Stop"})],
        )
        .await;

    let response = client
        .post(
            &path,
            json!({"change": [{
                "identity": {"@id": "req-1"},
                "kind": "add",
                "payload": {"@type": "RequirementDefinition", "name": "Again"}
            }]}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "DUPLICATE_ELEMENT");

    let response = client
        .post(
            &path,
            json!({"change": [{
                "kind": "update",
                "payload": {"@type": "RequirementDefinition", "@id": "req-2"}
            }]}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UNKNOWN_ELEMENT");

    // Without an explicit kind the same id becomes a new version
    let update = client
        .commit(
            project_id,
            vec![json!({"@type": "RequirementDefinition", "@id": "req-1", "name": "StopFaster"})],
        )
        .await;
    let changes = client
        .get_json(&format!("/projects/{}/commits/{}/changes", project_id, update))
        .await;
    assert_eq!(changes[0]["@type"], "DataVersion");
    assert_eq!(changes[0]["kind"], "update");
    assert_eq!(changes[0]["identity"]["@id"], "req-1");
    assert_eq!(changes[0]["payload"]["name"], "StopFaster");
}

#[tokio::test]
async fn test_previous_commit_and_idempotency_key() {
    let client = TestClient::spawn().await;
    let project = client.create_project("Concurrency").await;
    let project_id = project["@id"].as_str().unwrap();
    let path = format!("/projects/{}/commits", project_id);

    let first = client
        .commit(project_id, vec![json!({"@type": "PartDefinition", "name": "A"})])
        .await;
    client
        .commit(project_id, vec![json!({"@type": "PartDefinition", "name": "B"})])
        .await;

    let mut stale = commit_body(vec![json!({"@type": "PartDefinition", "name": "C"})]);
    stale["previousCommit"] = json!({"@id": first});
    let response = client.post(&path, stale).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "CONFLICT");

    let body = commit_body(vec![json!({"@type": "PartDefinition", "name": "Once"})]);
    let original: Value = client
        .post_with_key(&path, "retry-7", body.clone())
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let replayed: Value = client
        .post_with_key(&path, "retry-7", body)
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(original["@id"], replayed["@id"]);

    let commits = client.get_json(&path).await;
    assert_eq!(commits.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_projects_and_branches() {
    let client = TestClient::spawn().await;
    let health = client.get_json("/health").await;
    assert_eq!(health["status"], "healthy");

    let first = client.create_project("First").await;
    let second = client.create_project("Second").await;
    let projects = client.get_json("/projects").await;
    let ids: Vec<&Value> = projects.as_array().unwrap().iter().map(|p| &p["@id"]).collect();
    assert_eq!(ids, vec![&first["@id"], &second["@id"]]);

    let project_id = first["@id"].as_str().unwrap();
    let updated: Value = client
        .put(
            &format!("/projects/{}", project_id),
            json!({"description": "Brakes"}),
        )
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["name"], "First");
    assert_eq!(updated["description"], "Brakes");

    let head = client
        .commit(project_id, vec![json!({"@type": "PartDefinition", "name": "A"})])
        .await;

    let branch: Value = client
        .post(
            &format!("/projects/{}/branches", project_id),
            json!({"name": "feature"}),
        )
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(branch["head"]["@id"], head.as_str());
    assert_eq!(branch["owningProject"]["@id"], project_id);

    let branch_id = branch["@id"].as_str().unwrap();
    let response = client
        .post(
            &format!("/projects/{}/commits?branchId={}", project_id, branch_id),
            commit_body(vec![json!({"@type": "PartUsage", "name": "a"})]),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let on_feature: Value = response.json().await.unwrap();
    assert_eq!(on_feature["branch"]["@id"], branch_id);
    assert_eq!(on_feature["previousCommit"]["@id"], head.as_str());

    let main = client
        .get_json(&format!(
            "/projects/{}/branches/{}",
            project_id,
            first["defaultBranch"]["@id"].as_str().unwrap()
        ))
        .await;
    assert_eq!(main["head"]["@id"], head.as_str());

    let branches = client
        .get_json(&format!("/projects/{}/branches", project_id))
        .await;
    assert_eq!(branches.as_array().unwrap().len(), 2);

    let response = client.get("/projects/does-not-exist").await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NOT_FOUND");
}
