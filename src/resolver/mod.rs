//! The Dependency Resolver (§4.5): the iterative loop that pops a
//! pending node, extracts and classifies its dynamic parts, searches
//! for producers, and grows the DAG until every node resolves.

mod classify;
mod dynamic_parts;
mod producers;

pub use classify::classify_all;
pub use dynamic_parts::{extract as extract_dynamic_parts, NamedPart};

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use crate::bootstrap;
use crate::dag::{Dag, NodeId, NodeKind};
use crate::error::Result;
use crate::model::CookieSnapshot;
use crate::params::ParamClassification;
use crate::trace::ParsedTrace;

#[derive(Debug, Clone)]
pub enum IterationOutcome {
    BlockedOnDependencies(Vec<(NodeId, Vec<String>)>),
    AnalysisComplete,
    Skipped(NodeId),
    Progressed(NodeId),
}

/// §4.5 step 2: the asset guard. A node whose URL ends in `.js` or
/// whose response content type is HTML is not a meaningful dependency
/// source and is skipped outright.
fn is_script_or_html_asset(request: &crate::model::RequestRecord) -> bool {
    if request.url.path().to_ascii_lowercase().ends_with(".js") {
        return true;
    }
    request
        .response
        .as_ref()
        .map(|r| r.content_kind == crate::model::ContentKind::Html)
        .unwrap_or(false)
}

fn ensure_cookie_node(dag: &mut Dag, name: &str, value: &str, group_id: Option<crate::ids::GroupId>) -> Result<NodeId> {
    if let Some(existing) = dag.all_nodes().into_iter().find(|n| {
        matches!(&n.kind, NodeKind::Cookie { name: existing_name, .. } if existing_name == name)
    }) {
        return Ok(existing.id);
    }
    let id = dag.add_node(
        NodeKind::Cookie {
            name: name.to_string(),
            value: value.to_string(),
        },
        group_id,
    )?;
    dag.update_node(id, |n| n.extracted_parts.push(value.to_string()))?;
    Ok(id)
}

/// Run one resolver iteration, mutating `dag` and `queue` in place.
///
/// Callers that need the §5 copy-on-iterate rollback discipline (an
/// iteration that fails must leave the session exactly as it was)
/// should operate on a cloned `Dag`/`queue` and only swap them into the
/// session on `Ok`.
#[allow(clippy::too_many_arguments)]
pub fn iterate(
    dag: &mut Dag,
    queue: &mut VecDeque<NodeId>,
    trace: &ParsedTrace,
    cookies: Option<&CookieSnapshot>,
    input_variables: &HashMap<String, String>,
) -> Result<IterationOutcome> {
    let Some(node_id) = queue.pop_front() else {
        let unresolved = dag.unresolved_nodes();
        return Ok(if unresolved.is_empty() {
            IterationOutcome::AnalysisComplete
        } else {
            IterationOutcome::BlockedOnDependencies(unresolved)
        });
    };

    let group_id = dag.get_node(node_id)?.group_id;
    let request = match dag.get_node(node_id)?.kind.request() {
        Some(r) => r.clone(),
        None => {
            // Cookie and not-found nodes have nothing to extract.
            return Ok(IterationOutcome::Progressed(node_id));
        }
    };

    if is_script_or_html_asset(&request) {
        dag.update_node(node_id, |n| n.dynamic_parts.clear())?;
        debug!(node = %node_id, "skipped script/html asset node");
        return Ok(IterationOutcome::Skipped(node_id));
    }

    // Step 3: extract dynamic parts.
    let named_parts = dynamic_parts::extract(&request, input_variables);

    // Step 4: classify.
    let classified = classify::classify_all(&named_parts, trace, input_variables);

    // Step 5: match input variables directly present in the request.
    let mut node_input_vars = HashMap::new();
    for (name, value) in input_variables {
        if request.scannable_text().contains(value.as_str()) {
            node_input_vars.insert(name.clone(), value.clone());
        }
    }

    // Step 6: only `Dynamic`-classified parts remain eligible to block
    // completion; everything else is retained for the emitter but
    // dropped from the blocking list.
    let blocking: Vec<_> = classified
        .iter()
        .filter(|c| c.classification == ParamClassification::Dynamic)
        .cloned()
        .collect();
    let non_blocking: Vec<_> = classified
        .iter()
        .filter(|c| c.classification != ParamClassification::Dynamic)
        .cloned()
        .collect();

    let mut remaining_not_found = Vec::new();
    // (producer node id, literal value that producer supplies)
    let mut producer_edges: Vec<(NodeId, String)> = Vec::new();
    let mut bootstrap_source = None;

    for part in blocking.iter().chain(non_blocking.iter()) {
        let is_blocking = part.classification == ParamClassification::Dynamic;

        // Step 7a: cookie producer.
        if let Some(cookies) = cookies {
            if let Some(producers::Producer::Cookie { name }) = producers::find_cookie_producer(&part.value, cookies) {
                let cookie = cookies.get(name).expect("producer name came from this snapshot");
                let cookie_id = ensure_cookie_node(dag, name, &cookie.value, group_id)?;
                producer_edges.push((cookie_id, part.value.clone()));
                continue;
            }
        }

        // Step 7b: earlier-request producer.
        if let Some(producers::Producer::Request { index }) =
            producers::find_request_producer(&part.value, trace, request.captured_at)
        {
            let producer_record = &trace.entries[index];
            let producer_id = if let Some(existing) = dag.find_node_by_request(producer_record) {
                existing
            } else {
                let id = dag.add_node(NodeKind::Request(producer_record.clone()), group_id)?;
                queue.push_back(id);
                id
            };
            producer_edges.push((producer_id, part.value.clone()));
            continue;
        }

        // Step 8 (bootstrap path): no producer; session/static constants
        // with a known bootstrap pattern get a bootstrap source instead
        // of a not-found node.
        if matches!(
            part.classification,
            ParamClassification::SessionConstant | ParamClassification::StaticConstant
        ) {
            if let Some(source) = bootstrap::find_one(&part.value, trace, cookies) {
                bootstrap_source.get_or_insert(source);
                continue;
            }
        }

        if is_blocking {
            remaining_not_found.push(part.value.clone());
        }
    }

    // Step 9: add edges and mark extracted parts on producers. Cycle
    // detection rolls back the single offending edge and surfaces the
    // error to the caller, which owns the whole-iteration rollback
    // discipline (§5 copy-on-iterate).
    for (producer_id, value) in &producer_edges {
        dag.add_edge(node_id, *producer_id)?;
        dag.update_node(*producer_id, |p| {
            if !p.extracted_parts.contains(value) {
                p.extracted_parts.push(value.clone());
            }
        })?;
    }

    for value in &remaining_not_found {
        let id = dag.add_node(NodeKind::NotFound, group_id)?;
        dag.update_node(id, |n| n.dynamic_parts = vec![value.clone()])?;
        warn!(node = %node_id, value = %value, "no producer found for dynamic part");
    }

    // Step 10: persist the node.
    dag.update_node(node_id, |n| {
        for (k, v) in node_input_vars {
            n.input_variables.insert(k, v);
        }
        n.dynamic_parts = remaining_not_found;
        n.merge_classified_parameters(classified);
        if let Some(source) = bootstrap_source {
            n.bootstrap_source = Some(source);
        }
    })?;

    Ok(IterationOutcome::Progressed(node_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::NodeKind;
    use crate::trace::{parse, ParseOptions};

    fn single_post_trace() -> ParsedTrace {
        let bytes = serde_json::to_vec(&serde_json::json!({
            "log": {
                "version": "1.2", "creator": {"name": "t", "version": "1"},
                "entries": [{
                    "startedDateTime": "2024-01-01T00:00:00Z", "time": 1.0,
                    "request": {
                        "method": "POST", "url": "https://svc/api/search?q=foo", "httpVersion": "HTTP/1.1",
                        "headers": [], "queryString": [{"name": "q", "value": "foo"}],
                        "postData": {"mimeType": "application/json", "text": "{\"q\":\"foo\",\"ctx\":\"AB7defgh\"}"}
                    },
                    "response": {
                        "status": 200, "statusText": "OK", "httpVersion": "HTTP/1.1", "headers": [],
                        "content": {"size": 10, "mimeType": "application/json", "text": "{\"items\":[],\"token\":\"ZZZ111222\"}"}
                    },
                    "timings": {"send": 0.0, "wait": 0.0, "receive": 0.0}
                }]
            }
        }))
        .unwrap();
        parse(&bytes, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn s1_single_post_reaches_completion_in_one_iteration() {
        let trace = single_post_trace();
        let mut dag = Dag::new();
        let master = dag
            .add_node(NodeKind::MasterRequest(trace.entries[0].clone()), None)
            .unwrap();
        let mut queue = VecDeque::from([master]);
        let mut inputs = HashMap::new();
        inputs.insert("q".to_string(), "foo".to_string());

        let outcome = iterate(&mut dag, &mut queue, &trace, None, &inputs).unwrap();
        assert!(matches!(outcome, IterationOutcome::Progressed(_)));

        let final_outcome = iterate(&mut dag, &mut queue, &trace, None, &inputs).unwrap();
        assert!(matches!(final_outcome, IterationOutcome::AnalysisComplete));

        let node = dag.get_node(master).unwrap();
        assert!(node.dynamic_parts.is_empty());
        let ctx_param = node
            .classified_parameters
            .as_ref()
            .unwrap()
            .iter()
            .find(|p| p.value == "AB7defgh")
            .unwrap();
        assert_eq!(ctx_param.classification, ParamClassification::SessionConstant);
    }

    #[test]
    fn s3_skips_script_asset_node() {
        let mut dag = Dag::new();
        let request = crate::model::RequestRecord {
            method: "GET".into(),
            url: url::Url::parse("https://svc/app.js").unwrap(),
            headers: vec![],
            body: None,
            response: None,
            captured_at: chrono::Utc::now(),
        };
        let id = dag.add_node(NodeKind::Request(request), None).unwrap();
        let mut queue = VecDeque::from([id]);
        let trace = single_post_trace();
        let outcome = iterate(&mut dag, &mut queue, &trace, None, &HashMap::new()).unwrap();
        assert!(matches!(outcome, IterationOutcome::Skipped(_)));
    }
}
