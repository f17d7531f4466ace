//! The Code Emitter (§4.9): walks the resolved graph in topological
//! order and emits a runnable TypeScript client script with typed
//! inputs.
//!
//! Emission is plain `String`/`format!` building — no template-engine
//! dependency, matching how this crate's other text-rendering surface
//! (Graphviz/Mermaid-shaped diagrams) is built. It is deterministic:
//! given the same DAG (same node ids, same edges, same classified
//! parameters), the output text is byte-identical, since every ordering
//! decision below is either the topological sort or an explicit
//! lexical sort — nothing depends on hash-map iteration order.

use std::collections::{BTreeMap, HashMap};

use regex::escape as regex_escape;

use crate::bootstrap;
use crate::dag::{Dag, DagNode, NodeId, NodeKind};
use crate::error::{Error, Result};
use crate::model::RequestRecord;
use crate::params::{ClassifiedParameter, ParamClassification};
use crate::session::Session;

fn short_id(id: NodeId) -> String {
    id.to_string().replace('-', "")
}

fn sanitize_ident(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        out.insert(0, '_');
    }
    out
}

/// JSON path in the `$.a.b[0]` shape (as produced by
/// [`bootstrap::json_path_to`]) rendered as an optional-chaining JS
/// property-access expression rooted at `root`.
fn json_path_to_js_expr(root: &str, path: &str) -> String {
    let mut expr = root.to_string();
    let rest = path.strip_prefix('$').unwrap_or(path);
    let mut chars = rest.chars().peekable();
    let mut token = String::new();
    let mut in_bracket = false;

    let flush = |expr: &mut String, token: &mut String, in_bracket: bool| {
        if token.is_empty() {
            return;
        }
        if in_bracket {
            expr.push_str(&format!("?.[{token}]"));
        } else {
            expr.push_str(&format!("?.{token}"));
        }
        token.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                flush(&mut expr, &mut token, in_bracket);
            }
            '[' => {
                flush(&mut expr, &mut token, in_bracket);
                in_bracket = true;
            }
            ']' => {
                flush(&mut expr, &mut token, in_bracket);
                in_bracket = false;
            }
            _ => token.push(c),
        }
    }
    flush(&mut expr, &mut token, in_bracket);
    expr
}

/// A regex-over-textual-body fallback for a value whose response did
/// not parse as JSON (§4.9 point 2). Anchors on up to 24 literal
/// characters either side of the value's first occurrence and captures
/// the value itself, so replay captures whatever sits in that position
/// rather than the old literal.
fn regex_capture_pattern(body: &str, value: &str) -> Option<String> {
    let start = body.find(value)?;
    let end = start + value.len();
    const CONTEXT: usize = 24;
    let prefix_start = body[..start].char_indices().rev().nth(CONTEXT - 1).map(|(i, _)| i).unwrap_or(0);
    let suffix_end = body[end..]
        .char_indices()
        .nth(CONTEXT)
        .map(|(i, _)| end + i)
        .unwrap_or(body.len());
    let prefix = &body[prefix_start..start];
    let suffix = &body[end..suffix_end];
    Some(format!("{}([\\s\\S]*?){}", regex_escape(prefix), regex_escape(suffix)))
}

/// One interpolation substitution applied to a node's request text:
/// the literal value observed in the trace, replaced by a reference
/// into that node's `params` argument.
struct Substitution {
    value: String,
    param_name: String,
}

/// Where a node function's parameter comes from at the call site in
/// the top-level entry point.
#[derive(Clone)]
enum ParamSource {
    Input(String),
    SessionConstant(String),
    Captured { producer_short: String, index: usize },
    /// A cookie's value, already known at emission time from the
    /// recorded snapshot.
    CookieLiteral(String),
}

struct EmitNode {
    id: NodeId,
    short: String,
    fn_name: String,
    request: RequestRecord,
    is_master: bool,
    url_text: String,
    body_text: Option<String>,
    /// Parameter name -> source, sorted for deterministic signatures.
    params: BTreeMap<String, ParamSource>,
    captures: Vec<(String, String)>, // (field name, extraction expression)
}

fn find_producer_for_value<'a>(dag: &'a Dag, node_id: NodeId, value: &str) -> Option<(&'a DagNode, usize)> {
    for producer_id in dag.successors(node_id) {
        if let Ok(producer) = dag.get_node(producer_id) {
            if let Some(index) = producer.extracted_parts.iter().position(|v| v == value) {
                return Some((producer, index));
            }
        }
    }
    None
}

fn reverse_lookup_input_name(input_variables: &HashMap<String, String>, value: &str) -> Option<String> {
    input_variables.iter().find(|(_, v)| v.as_str() == value).map(|(k, _)| k.clone())
}

/// Build the substitution and parameter plan for one request node.
fn plan_node(dag: &Dag, node: &DagNode, request: &RequestRecord) -> (Vec<Substitution>, BTreeMap<String, ParamSource>) {
    let mut substitutions = Vec::new();
    let mut params: BTreeMap<String, ParamSource> = BTreeMap::new();
    let mut already_substituted: Vec<&str> = Vec::new();

    for (user_var_name, value) in &node.input_variables {
        let param_name = format!("input_{}", sanitize_ident(user_var_name));
        substitutions.push(Substitution {
            value: value.clone(),
            param_name: param_name.clone(),
        });
        params.insert(param_name, ParamSource::Input(user_var_name.clone()));
        already_substituted.push(value.as_str());
    }

    let classified: &[ClassifiedParameter] = node.classified_parameters.as_deref().unwrap_or(&[]);
    for part in classified {
        if already_substituted.contains(&part.value.as_str()) {
            continue;
        }

        if let Some((producer, index)) = find_producer_for_value(dag, node.id, &part.value) {
            let param_name = format!("dep_{}_{}", short_id(node.id), sanitize_ident(&part.name));
            substitutions.push(Substitution {
                value: part.value.clone(),
                param_name: param_name.clone(),
            });
            params.insert(
                param_name,
                ParamSource::Captured {
                    producer_short: short_id(producer.id),
                    index,
                },
            );
            already_substituted.push(part.value.as_str());
            continue;
        }

        match part.classification {
            ParamClassification::UserInput => {
                if let Some(name) = reverse_lookup_input_name(&node.input_variables, &part.value) {
                    let param_name = format!("input_{}", sanitize_ident(&name));
                    if !params.contains_key(&param_name) {
                        substitutions.push(Substitution {
                            value: part.value.clone(),
                            param_name: param_name.clone(),
                        });
                        params.insert(param_name, ParamSource::Input(name));
                        already_substituted.push(part.value.as_str());
                    }
                }
            }
            ParamClassification::SessionConstant => {
                let param_name = format!("session_{}", sanitize_ident(&part.name));
                substitutions.push(Substitution {
                    value: part.value.clone(),
                    param_name: param_name.clone(),
                });
                params.insert(param_name, ParamSource::SessionConstant(sanitize_ident(&part.name)));
                already_substituted.push(part.value.as_str());
            }
            // Static constants and unresolved optional parts are left
            // inline as the literal observed in the trace.
            _ => {}
        }
    }

    // Cookie producers: the value is already known at emission time
    // from the recorded snapshot, so it becomes a literal parameter
    // rather than a captured call result.
    for producer_id in dag.successors(node.id) {
        if let Ok(producer) = dag.get_node(producer_id) {
            if let NodeKind::Cookie { name, value } = &producer.kind {
                if request.scannable_text().contains(value.as_str()) && !already_substituted.contains(&value.as_str()) {
                    let param_name = format!("cookie_{}", sanitize_ident(name));
                    substitutions.push(Substitution {
                        value: value.clone(),
                        param_name: param_name.clone(),
                    });
                    params.insert(param_name, ParamSource::CookieLiteral(value.clone()));
                    already_substituted.push(value.as_str());
                }
            }
        }
    }

    (substitutions, params)
}

fn apply_substitutions(text: &str, substitutions: &[Substitution]) -> String {
    let mut ordered: Vec<&Substitution> = substitutions.iter().collect();
    ordered.sort_by_key(|s| std::cmp::Reverse(s.value.len()));
    let mut out = text.to_string();
    for s in ordered {
        let replacement = format!("${{params.{}}}", s.param_name);
        out = out.replace(&s.value, &replacement);
    }
    out
}

fn ts_type_of(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(_) => "string".to_string(),
        serde_json::Value::Number(_) => "number".to_string(),
        serde_json::Value::Bool(_) => "boolean".to_string(),
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Array(items) => {
            let inner = items.first().map(ts_type_of).unwrap_or_else(|| "unknown".to_string());
            format!("{inner}[]")
        }
        serde_json::Value::Object(_) => "Record<string, unknown>".to_string(),
    }
}

fn emit_body_interface(name: &str, value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::Object(map)) if !map.is_empty() => {
            let mut out = format!("interface {name} {{\n");
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                out.push_str(&format!("  {}: {};\n", sanitize_ident(key), ts_type_of(&map[key])));
            }
            out.push_str("}\n");
            out
        }
        Some(other) => format!("type {name} = {};\n", ts_type_of(other)),
        None => format!("type {name} = unknown;\n"),
    }
}

fn nodes_for_emission(session: &Session) -> Result<Vec<NodeId>> {
    let order = session.dag.topological_sort()?;

    let group_ids: Vec<_> = session.workflow_groups.keys().copied().collect();
    let selected: Option<Vec<NodeId>> = match (session.active_workflow_id, group_ids.len()) {
        (Some(active), _) => Some(
            session
                .dag
                .nodes_by_group(active)
                .into_iter()
                .map(|n| n.id)
                .collect(),
        ),
        (None, 0) => None, // degenerate single-workflow case: every node
        (None, 1) => Some(session.dag.nodes_by_group(group_ids[0]).into_iter().map(|n| n.id).collect()),
        (None, _) => {
            return Err(Error::Internal(
                "multiple workflow groups present but none is active".to_string(),
            ))
        }
    };

    Ok(match selected {
        Some(ids) => order.into_iter().filter(|id| ids.contains(id)).collect(),
        None => order,
    })
}

/// Emit a runnable TypeScript client script for a completed session
/// (§4.9). Refuses with `analysis-incomplete` if the session is not
/// ready for code generation.
pub fn emit(session: &Session) -> Result<String> {
    let completion = session.analyze_completion_state();
    if !completion.is_complete {
        return Err(Error::analysis_incomplete(completion.blockers, completion.diagnostics));
    }

    let ordered_ids = nodes_for_emission(session)?;

    let mut emit_nodes: Vec<EmitNode> = Vec::new();
    for id in &ordered_ids {
        let node = session.dag.get_node(*id)?;
        let Some(request) = node.kind.request() else {
            continue; // cookie nodes contribute no function of their own
        };
        let (substitutions, params) = plan_node(&session.dag, node, request);
        let url_text = apply_substitutions(request.url.as_str(), &substitutions);
        let body_text = request.body.as_deref().map(|b| apply_substitutions(b, &substitutions));

        let captures = node
            .extracted_parts
            .iter()
            .enumerate()
            .map(|(index, value)| {
                let field = format!("capture_{index}");
                let expr = match &request.response {
                    Some(resp) if resp.parsed_body.is_some() => {
                        let parsed = resp.parsed_body.as_ref().unwrap();
                        match bootstrap::json_path_to(parsed, value) {
                            Some(path) => format!("String({} ?? \"\")", json_path_to_js_expr("body", &path)),
                            None => "\"\"".to_string(),
                        }
                    }
                    Some(resp) => match resp.body.as_deref().and_then(|b| regex_capture_pattern(b, value)) {
                        Some(pattern) => format!(
                            "(text.match(new RegExp({pattern:?})) ?? [])[1] ?? \"\"",
                        ),
                        None => "\"\"".to_string(),
                    },
                    None => "\"\"".to_string(),
                };
                (field, expr)
            })
            .collect();

        emit_nodes.push(EmitNode {
            id: *id,
            short: short_id(*id),
            fn_name: format!("request_{}", short_id(*id)),
            request: request.clone(),
            is_master: matches!(node.kind, NodeKind::MasterRequest(_)),
            url_text,
            body_text,
            params,
            captures,
        });
    }

    Ok(render(session, &emit_nodes))
}

fn render(session: &Session, nodes: &[EmitNode]) -> String {
    let mut out = String::new();
    out.push_str("// Generated by traceweave. Do not edit by hand.\n\n");
    out.push_str("export interface ReplayContext {\n  baseHeaders?: Record<string, string>;\n}\n\n");

    for node in nodes {
        let response_body = node.request.response.as_ref().and_then(|r| r.parsed_body.as_ref());
        out.push_str(&emit_body_interface(&format!("ResponseBody_{}", node.short), response_body));
        out.push('\n');

        out.push_str(&format!("interface Result_{} {{\n  status: number;\n  body: ResponseBody_{};\n", node.short, node.short));
        for (field, _) in &node.captures {
            out.push_str(&format!("  {field}: string;\n"));
        }
        out.push_str("}\n\n");
    }

    for node in nodes {
        let param_fields: Vec<String> = node
            .params
            .keys()
            .map(|name| format!("{name}: string"))
            .collect();
        let params_type = if param_fields.is_empty() {
            "Record<string, never>".to_string()
        } else {
            format!("{{ {} }}", param_fields.join("; "))
        };

        out.push_str(&format!(
            "async function {}(ctx: ReplayContext, params: {}): Promise<Result_{}> {{\n",
            node.fn_name, params_type, node.short
        ));
        out.push_str(&format!("  const url = `{}`;\n", node.url_text));
        out.push_str(&format!("  const method = {:?};\n", node.request.method));
        out.push_str("  const headers: Record<string, string> = { ...ctx.baseHeaders };\n");
        if let Some(body) = &node.body_text {
            out.push_str(&format!("  const requestBody = `{body}`;\n"));
            out.push_str("  const response = await fetch(url, { method, headers, body: requestBody });\n");
        } else {
            out.push_str("  const response = await fetch(url, { method, headers });\n");
        }
        out.push_str("  const text = await response.text();\n");
        out.push_str("  const body_ = text.length > 0 ? JSON.parse(text) : undefined;\n");
        out.push_str(&format!("  const body = body_ as ResponseBody_{};\n", node.short));
        out.push_str("  return {\n    status: response.status,\n    body,\n");
        for (field, expr) in &node.captures {
            out.push_str(&format!("    {field}: {expr},\n"));
        }
        out.push_str("  };\n}\n\n");
    }

    let input_names: Vec<String> = {
        let mut names: Vec<String> = nodes
            .iter()
            .flat_map(|n| n.params.values())
            .filter_map(|p| match p {
                ParamSource::Input(name) => Some(sanitize_ident(name)),
                _ => None,
            })
            .collect();
        names.sort();
        names.dedup();
        names
    };
    let session_const_names: Vec<String> = {
        let mut names: Vec<String> = nodes
            .iter()
            .flat_map(|n| n.params.values())
            .filter_map(|p| match p {
                ParamSource::SessionConstant(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        names.sort();
        names.dedup();
        names
    };

    let inputs_type = if input_names.is_empty() {
        "Record<string, never>".to_string()
    } else {
        format!("{{ {} }}", input_names.iter().map(|n| format!("{n}: string")).collect::<Vec<_>>().join("; "))
    };
    let session_const_type = if session_const_names.is_empty() {
        "Record<string, never>".to_string()
    } else {
        format!(
            "{{ {} }}",
            session_const_names.iter().map(|n| format!("{n}: string")).collect::<Vec<_>>().join("; ")
        )
    };

    let master = nodes.iter().find(|n| n.is_master).or_else(|| nodes.last());
    let master_result_type = master.map(|n| format!("Result_{}", n.short)).unwrap_or_else(|| "void".to_string());

    out.push_str(&format!(
        "export async function run(ctx: ReplayContext, inputs: {inputs_type}, sessionConstants: {session_const_type}): Promise<{master_result_type}> {{\n"
    ));

    let mut last_result_var: Option<String> = None;
    for node in nodes {
        let mut args: Vec<String> = Vec::new();
        for (param_name, source) in &node.params {
            let expr = match source {
                ParamSource::Input(name) => format!("inputs.{}", sanitize_ident(name)),
                ParamSource::SessionConstant(name) => format!("sessionConstants.{name}"),
                ParamSource::Captured { producer_short, index } => format!("result_{producer_short}.capture_{index}"),
                ParamSource::CookieLiteral(value) => format!("{value:?}"),
            };
            args.push(format!("{param_name}: {expr}"));
        }
        let args_obj = if args.is_empty() { "{}".to_string() } else { format!("{{ {} }}", args.join(", ")) };
        out.push_str(&format!(
            "  const result_{} = await {}(ctx, {});\n",
            node.short, node.fn_name, args_obj
        ));
        last_result_var = Some(format!("result_{}", node.short));
    }

    out.push_str(&format!("  return {};\n}}\n", last_result_var.unwrap_or_else(|| "undefined as never".to_string())));

    let _ = session; // session kept for future use (prompt banner, etc.)
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::NodeKind;
    use crate::ids::SessionId;
    use crate::trace::{parse, ParseOptions};
    use std::collections::VecDeque;

    fn search_trace() -> crate::trace::ParsedTrace {
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
    fn refuses_when_session_incomplete() {
        let trace = search_trace();
        let session = Session::new(SessionId::new(), "search".to_string(), trace, None);
        let err = emit(&session).unwrap_err();
        assert!(matches!(err, Error::AnalysisIncomplete { .. }));
    }

    #[test]
    fn emits_a_deterministic_script_for_a_resolved_single_node_session() {
        let trace = search_trace();
        let mut session = Session::new(SessionId::new(), "search".to_string(), trace.clone(), None);
        let master = session
            .dag
            .add_node(NodeKind::MasterRequest(trace.entries[0].clone()), None)
            .unwrap();
        session.master_node_id = Some(master);
        session.queue = VecDeque::from([master]);
        session.input_variables.insert("q".to_string(), "foo".to_string());

        session.run_resolver_iteration().unwrap();
        let outcome = session.run_resolver_iteration().unwrap();
        assert!(matches!(outcome, crate::resolver::IterationOutcome::AnalysisComplete));
        assert!(session.dag.is_complete());

        let first = emit(&session).unwrap();
        let second = emit(&session).unwrap();
        assert_eq!(first, second, "emission must be deterministic for an unchanged DAG");
        assert!(first.contains("export async function run"));
        assert!(first.contains("input_q"));
    }
}
