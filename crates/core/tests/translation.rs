//! End-to-end tests for attribute translation through the public API.
//!
//! Configurations are written to temporary files and loaded the same way an
//! embedding proxy would load them.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tempfile::TempDir;

use attrmap_core::{AttributeMapConfig, AttributeMapper, ExternalAttributes, InternalAttributes};

// ===========================================================================
// Helpers
// ===========================================================================

const ATTRIBUTES_TOML: &str = r#"
[attributes.mail]
saml = ["mail", "email", "urn:oid:0.9.2342.19200300.100.1.3"]
openid = ["email"]

[attributes.givenname]
saml = ["givenName"]
openid = ["given_name"]

[attributes.street]
openid = ["address.street_address"]

[attributes.eppn]
saml = ["eduPersonPrincipalName"]

[attributes.schac_home_organization]
saml = ["schacHomeOrganization"]

[template_attributes.schac_home_organization]
saml = ["${eppn[0] | scope}"]

[template_attributes.display_name]
saml = ["${givenname[0]} (${scope(mail[0])})"]
"#;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

fn load_mapper() -> AttributeMapper {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "attributes.toml", ATTRIBUTES_TOML);
    let config = AttributeMapConfig::load_and_validate(&path).expect("config should load");
    AttributeMapper::new(config).expect("mapper should build")
}

fn external(value: Value) -> ExternalAttributes {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn internal(pairs: &[(&str, &[&str])]) -> InternalAttributes {
    pairs
        .iter()
        .map(|(name, values)| {
            (
                name.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

/// Collects formatted log output so tests can assert on diagnostics.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn round_trip_on_aligned_config() {
    let mapper = load_mapper();
    let original = internal(&[("givenname", &["Jane"])]);

    let ext = mapper.from_internal("openid", &original);
    assert_eq!(Value::Object(ext.clone()), json!({"given_name": ["Jane"]}));
    assert_eq!(mapper.to_internal("openid", &ext), original);
}

#[test]
fn unknown_profile_yields_empty_filter() {
    let mapper = load_mapper();
    assert!(mapper
        .to_internal_filter("nonexistent", &["email", "givenName"])
        .is_empty());
}

#[test]
fn unknown_profile_logs_warning() {
    let mapper = load_mapper();
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        mapper.to_internal_filter("nonexistent", &["email"]);
    });

    let output = logs.contents();
    assert!(output.contains("WARN"), "unexpected log output: {output}");
    assert!(output.contains("nonexistent"), "unexpected log output: {output}");
}

#[test]
fn filter_deduplicates_internal_names() {
    let mapper = load_mapper();
    let names = mapper.to_internal_filter(
        "saml",
        &["email", "urn:oid:0.9.2342.19200300.100.1.3", "givenName", "notMapped"],
    );
    assert_eq!(names, vec!["givenname", "mail"]);
}

#[test]
fn priority_collation() {
    let mapper = load_mapper();
    let data = external(json!({
        "email": ["y@example.org"],
        "mail": ["x1@example.org", "x2@example.org"],
    }));
    let result = mapper.to_internal("saml", &data);
    assert_eq!(
        result["mail"],
        vec!["x1@example.org", "x2@example.org", "y@example.org"]
    );
}

#[test]
fn dotted_oid_name_is_a_nested_path() {
    let mapper = load_mapper();

    // Under the default separator the OID is split into path segments, so a
    // flat key spelled like the OID is never found.
    let flat = external(json!({
        "urn:oid:0.9.2342.19200300.100.1.3": ["flat@example.org"],
    }));
    assert!(mapper.to_internal("saml", &flat).is_empty());

    let nested = external(json!({
        "urn:oid:0": {"9": {"2342": {"19200300": {"100": {"1": {"3": ["z@example.org"]}}}}}},
    }));
    assert_eq!(mapper.to_internal("saml", &nested)["mail"], vec!["z@example.org"]);

    // The inverse table is keyed by the full name and is unaffected.
    assert_eq!(
        mapper.to_internal_filter("saml", &["urn:oid:0.9.2342.19200300.100.1.3"]),
        vec!["mail"]
    );
}

#[test]
fn oid_name_is_flat_with_another_separator() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "attributes.toml",
        r#"
[attributes.mail]
saml = ["urn:oid:0.9.2342.19200300.100.1.3", "email"]

[options]
separator = "/"
"#,
    );
    let mapper = AttributeMapper::from_file(&path).unwrap();
    let data = external(json!({
        "email": ["y@example.org"],
        "urn:oid:0.9.2342.19200300.100.1.3": ["x@example.org"],
    }));
    assert_eq!(
        mapper.to_internal("saml", &data)["mail"],
        vec!["x@example.org", "y@example.org"]
    );
}

#[test]
fn template_sees_output_of_earlier_declared_template() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "attributes.toml",
        r#"
[attributes.eppn]
saml = ["eduPersonPrincipalName"]

[attributes.affiliation]
saml = ["eduPersonAffiliation"]

[template_attributes.zdomain]
saml = ["${eppn[0] | scope}"]

[template_attributes.affil_scoped]
saml = ["${affiliation[0]}@${zdomain[0]}"]
"#,
    );
    let mapper = AttributeMapper::from_file(&path).unwrap();
    let data = external(json!({
        "eduPersonPrincipalName": ["j@example.org"],
        "eduPersonAffiliation": ["member"],
    }));
    let result = mapper.to_internal("saml", &data);
    assert_eq!(result["affil_scoped"], vec!["member@example.org"]);
}

#[test]
fn nested_path_round_trip() {
    let mapper = load_mapper();
    let data = external(json!({"address": {"street_address": ["Main St"]}}));

    let result = mapper.to_internal("openid", &data);
    assert_eq!(result, internal(&[("street", &["Main St"])]));

    let back = mapper.from_internal("openid", &result);
    assert_eq!(back, data);
}

#[test]
fn template_fallback_preserves_mapped_value() {
    let mapper = load_mapper();
    let data = external(json!({
        "eduPersonPrincipalName": ["unscoped"],
        "schacHomeOrganization": ["example.org"],
    }));
    let result = mapper.to_internal("saml", &data);
    assert_eq!(result["schac_home_organization"], vec!["example.org"]);
}

#[test]
fn scope_failure_is_silent_and_isolated() {
    let mapper = load_mapper();
    let data = external(json!({
        "eduPersonPrincipalName": ["jdoe@example.org"],
        "email": ["not-an-address"],
        "givenName": ["Jane"],
    }));
    let result = mapper.to_internal("saml", &data);

    // display_name fails on scope(mail[0]) and is simply absent.
    assert!(!result.contains_key("display_name"));
    // Unrelated attributes, including other templates, are unaffected.
    assert_eq!(result["schac_home_organization"], vec!["example.org"]);
    assert_eq!(result["givenname"], vec!["Jane"]);
    assert_eq!(result["mail"], vec!["not-an-address"]);
}

#[test]
fn template_renders_from_mapped_attributes() {
    let mapper = load_mapper();
    let data = external(json!({
        "email": ["jane@example.org"],
        "givenName": ["Jane"],
    }));
    let result = mapper.to_internal("saml", &data);
    assert_eq!(result["display_name"], vec!["Jane (example.org)"]);
}

#[test]
fn no_mapping_means_key_omitted() {
    let mapper = load_mapper();

    // street has no saml mapping.
    let data = external(json!({"address": {"street_address": ["Main St"]}, "street": ["x"]}));
    assert!(!mapper.to_internal("saml", &data).contains_key("street"));

    let ext = mapper.from_internal("saml", &internal(&[("street", &["Main St"])]));
    assert!(ext.is_empty());
}

#[test]
fn empty_results_never_materialize() {
    let mapper = load_mapper();
    let data = external(json!({
        "email": [],
        "given_name": "",
        "address": {"street_address": null},
    }));
    let result = mapper.to_internal("openid", &data);
    assert!(result.is_empty(), "unexpected result: {result:?}");
}

#[test]
fn json_config_behaves_like_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "attributes.json",
        r#"{
            "attributes": {"mail": {"openid": ["email"]}},
            "template_attributes": {"domain": {"openid": ["${mail[0] | scope}"]}}
        }"#,
    );
    let mapper = AttributeMapper::new(AttributeMapConfig::load_and_validate(&path).unwrap()).unwrap();

    let result = mapper.to_internal("openid", &external(json!({"email": "a@example.org"})));
    assert_eq!(
        result,
        internal(&[("domain", &["example.org"]), ("mail", &["a@example.org"])])
    );
}

#[test]
fn malformed_config_fails_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "broken.toml", "[template_attributes.x]\nsaml = [\"${a}\"]\n");
    assert!(AttributeMapConfig::load_and_validate(&path).is_err());
}

#[test]
fn mapper_is_shareable_across_threads() {
    let mapper = Arc::new(load_mapper());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mapper = Arc::clone(&mapper);
            std::thread::spawn(move || {
                let name = format!("user{i}");
                let ext = mapper.from_internal("openid", &internal(&[("givenname", &[name.as_str()])]));
                mapper.to_internal("openid", &ext)
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.join().unwrap();
        assert_eq!(result["givenname"], vec![format!("user{i}")]);
    }
}
