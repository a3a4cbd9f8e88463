use crate::logic::{CommitApplier, CommitRequest, ProjectOperations};
use crate::model::{NewChange, NewCommit, NewProject, Project};
use crate::store::traits::Store;
use anyhow::{Context, Result};
use log::info;
use serde_json::{json, Value};

pub const SEED_PROJECT_NAME: &str = "Braking System";

/// Wrap payloads into a commit request for the default branch
fn seed_commit(comment: &str, payloads: Vec<Value>) -> CommitRequest {
    CommitRequest::new(NewCommit {
        record_type: Some("Commit".to_string()),
        change: payloads
            .into_iter()
            .map(|payload| NewChange {
                record_type: Some("DataVersion".to_string()),
                identity: None,
                kind: None,
                payload: Some(payload),
            })
            .collect(),
        comment: Some(comment.to_string()),
        description: None,
        previous_commit: None,
    })
}

fn requirement(id: &str, human_id: &str, name: &str, text: &str) -> Value {
    json!({
        "@type": "RequirementDefinition",
        "@id": id,
        "name": name,
        "declaredName": name,
        "humanId": human_id,
        "text": text,
    })
}

fn part_definition(id: &str, human_id: &str, name: &str, general: &[&str]) -> Value {
    json!({
        "@type": "PartDefinition",
        "@id": id,
        "name": name,
        "declaredName": name,
        "humanId": human_id,
        "general": general.iter().map(|g| json!({"@id": g})).collect::<Vec<_>>(),
    })
}

fn part_usage(id: &str, name: &str, definition: &str, owner: Option<&str>) -> Value {
    json!({
        "@type": "PartUsage",
        "@id": id,
        "name": name,
        "definition": [{"@id": definition}],
        "owningUsage": owner.map(|o| json!({"@id": o})),
    })
}

fn satisfy(id: &str, requirement: &str, subject: &str, method: &str) -> Value {
    json!({
        "@type": "SatisfyRequirementUsage",
        "@id": id,
        "name": format!("{}Satisfies{}", subject, requirement),
        "satisfiedRequirement": {"@id": requirement},
        "satisfyingSubject": {"@id": subject},
        "verificationMethod": method,
        "satisfactionStatus": "Designed",
    })
}

fn requirements() -> Vec<Value> {
    vec![
        requirement(
            "req-braking-distance",
            "REQ-001",
            "BrakingDistanceRequirement",
            "The vehicle shall stop from 100 km/h within 40 m on dry asphalt.",
        ),
        requirement(
            "req-response-time",
            "REQ-002",
            "ResponseTimeRequirement",
            "Brake force shall build up within 150 ms of pedal actuation.",
        ),
        requirement(
            "req-safety",
            "REQ-003",
            "SafetyRequirement",
            "A single hydraulic line failure shall not remove all braking capability.",
        ),
        requirement(
            "req-environmental",
            "REQ-004",
            "EnvironmentalRequirement",
            "The system shall operate between -40 C and 85 C.",
        ),
    ]
}

fn parts() -> Vec<Value> {
    let mut component = part_definition("part-brake-component", "PART-000", "BrakeComponent", &[]);
    component["isAbstract"] = json!(true);

    vec![
        component,
        part_definition("part-brake-system", "PART-001", "BrakeSystem", &[]),
        part_definition("part-brake-pedal", "PART-002", "BrakePedal", &["part-brake-component"]),
        part_definition("part-brake-caliper", "PART-003", "BrakeCaliper", &["part-brake-component"]),
        part_definition("part-brake-disc", "PART-004", "BrakeDisc", &["part-brake-component"]),
        part_definition("part-abs-controller", "PART-005", "ABSController", &["part-brake-component"]),
        part_definition("part-brake-lines", "PART-006", "BrakeLines", &["part-brake-component"]),
        json!({
            "@type": "PortDefinition",
            "@id": "port-def-hydraulic",
            "name": "HydraulicPort",
        }),
    ]
}

fn structure() -> Vec<Value> {
    vec![
        part_usage("usage-brake-system", "brakeSystem", "part-brake-system", None),
        part_usage("usage-pedal", "pedal", "part-brake-pedal", Some("usage-brake-system")),
        part_usage("usage-front-caliper", "frontCaliper", "part-brake-caliper", Some("usage-brake-system")),
        part_usage("usage-front-disc", "frontDisc", "part-brake-disc", Some("usage-brake-system")),
        part_usage("usage-abs", "abs", "part-abs-controller", Some("usage-brake-system")),
        part_usage("usage-lines", "lines", "part-brake-lines", Some("usage-brake-system")),
        json!({
            "@type": "PortUsage",
            "@id": "port-lines-out",
            "name": "linesOut",
            "definition": [{"@id": "port-def-hydraulic"}],
            "owningUsage": {"@id": "usage-lines"},
        }),
        json!({
            "@type": "PortUsage",
            "@id": "port-caliper-in",
            "name": "caliperIn",
            "definition": [{"@id": "port-def-hydraulic"}],
            "owningUsage": {"@id": "usage-front-caliper"},
        }),
        json!({
            "@type": "ConnectionUsage",
            "@id": "conn-lines-caliper",
            "name": "hydraulicFeed",
            "ends": [{"@id": "port-lines-out"}, {"@id": "port-caliper-in"}],
            "owningUsage": {"@id": "usage-brake-system"},
        }),
    ]
}

fn satisfactions() -> Vec<Value> {
    vec![
        satisfy("sat-distance-system", "req-braking-distance", "part-brake-system", "Test"),
        satisfy("sat-response-abs", "req-response-time", "part-abs-controller", "Analysis"),
        satisfy("sat-response-pedal", "req-response-time", "part-brake-pedal", "Test"),
        satisfy("sat-safety-lines", "req-safety", "part-brake-lines", "Inspection"),
        satisfy("sat-safety-abs", "req-safety", "part-abs-controller", "Analysis"),
        satisfy("sat-environment-caliper", "req-environmental", "part-brake-caliper", "Test"),
    ]
}

/// Create the braking-system demo project: requirements, part definitions,
/// the assembled structure and its satisfy relationships, one commit each
pub async fn load_seed_data<S: Store>(store: &S) -> Result<Project> {
    let project = ProjectOperations::create_project(
        store,
        NewProject {
            record_type: Some("Project".to_string()),
            name: SEED_PROJECT_NAME.to_string(),
            description: Some("Hydraulic braking system with ABS".to_string()),
        },
    )
    .await
    .context("Failed to create seed project")?;

    let applier = CommitApplier::new(store, 0);
    let steps = [
        ("Add braking requirements", requirements()),
        ("Add part definitions", parts()),
        ("Assemble braking system structure", structure()),
        ("Link requirement satisfaction", satisfactions()),
    ];

    for (comment, payloads) in steps {
        let commit = applier
            .apply(&project.id, seed_commit(comment, payloads))
            .await
            .with_context(|| format!("Seed commit '{}' failed", comment))?;
        info!("Seeded '{}' as commit {}", comment, commit.id);
    }

    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::Materializer;
    use crate::model::ElementKind;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_seed_builds_full_model() {
        let store = MemoryStore::new();
        let project = load_seed_data(&store).await.unwrap();

        let commits = ProjectOperations::list_commits(&store, &project.id).await.unwrap();
        assert_eq!(commits.len(), 4);

        let head = ProjectOperations::resolve_head(&store, &project.id)
            .await
            .unwrap()
            .unwrap();
        let visible = Materializer::new(&store)
            .visible_elements(&project.id, &head)
            .await
            .unwrap();
        let total = requirements().len() + parts().len() + structure().len() + satisfactions().len();
        assert_eq!(visible.len(), total);

        let pedal = visible.iter().find(|e| e.id == "part-brake-pedal").unwrap();
        assert_eq!(pedal.kind, ElementKind::PartDefinition);
        assert_eq!(pedal.name(), Some("BrakePedal"));
        assert_eq!(pedal.attribute("humanId"), Some(&json!("PART-002")));
    }
}
