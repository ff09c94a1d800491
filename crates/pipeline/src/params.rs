//! Serialization of run parameters into Kedro's `--params` syntax.
//!
//! `{"horizon": 7, "model": {"kind": "arima"}}` becomes
//! `horizon=7,model.kind=arima`. Kedro splits the list on `,` and each
//! pair on the first `=`, so neither may appear where it would be
//! misread.

use runner_core::types::Params;
use serde_json::Value;

use crate::error::PipelineError;

/// Render `params` as a single `k=v,k2=v2` string (sorted by key).
pub fn to_kedro_params(params: &Params) -> Result<String, PipelineError> {
    let mut pairs = Vec::new();
    flatten(None, params, &mut pairs)?;
    pairs.sort();
    Ok(pairs.join(","))
}

fn flatten(
    prefix: Option<&str>,
    params: &Params,
    pairs: &mut Vec<String>,
) -> Result<(), PipelineError> {
    for (key, value) in params {
        let full_key = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        if key.is_empty() || key.contains([',', '=', '.']) {
            return Err(invalid(&full_key, "keys must be non-empty and free of ',', '=' and '.'"));
        }

        let rendered = match value {
            Value::Object(nested) => {
                flatten(Some(&full_key), nested, pairs)?;
                continue;
            }
            Value::Array(_) => return Err(invalid(&full_key, "list values are not supported")),
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
        };
        if rendered.contains(',') {
            return Err(invalid(&full_key, "values must not contain ','"));
        }
        pairs.push(format!("{full_key}={rendered}"));
    }
    Ok(())
}

fn invalid(key: &str, reason: &str) -> PipelineError {
    PipelineError::InvalidParameters {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn scalars_render_in_key_order() {
        let rendered = to_kedro_params(&params(json!({
            "x": 1,
            "name": "daily run",
            "ratio": 0.5,
            "dry": false,
            "limit": null,
        })))
        .unwrap();
        assert_eq!(rendered, "dry=false,limit=null,name=daily run,ratio=0.5,x=1");
    }

    #[test]
    fn empty_params_render_empty() {
        assert_eq!(to_kedro_params(&Params::new()).unwrap(), "");
    }

    #[test]
    fn nested_objects_become_dotted_keys() {
        let rendered =
            to_kedro_params(&params(json!({"model": {"kind": "arima", "order": {"p": 2}}})))
                .unwrap();
        assert_eq!(rendered, "model.kind=arima,model.order.p=2");
    }

    #[test]
    fn values_may_contain_equals() {
        let rendered = to_kedro_params(&params(json!({"filter": "a=b"}))).unwrap();
        assert_eq!(rendered, "filter=a=b");
    }

    #[test]
    fn rejects_unrepresentable_params() {
        let err = to_kedro_params(&params(json!({"s": "a,b"}))).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameters { ref key, .. } if key == "s"));

        assert!(to_kedro_params(&params(json!({"list": [1, 2]}))).is_err());
        assert!(to_kedro_params(&params(json!({"a=b": 1}))).is_err());
        assert!(to_kedro_params(&params(json!({"a.b": 1}))).is_err());
        assert!(to_kedro_params(&params(json!({"": 1}))).is_err());

        let err = to_kedro_params(&params(json!({"m": {"bad,key": 1}}))).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameters { ref key, .. } if key == "m.bad,key"));
    }
}
