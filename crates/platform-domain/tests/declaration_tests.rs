use platform_domain::{load_declaration, parse_declaration, ApplicationDeclaration, ClusterDeclaration, DomainError,
                      Environment};
use reconcile::{Declaration, ReconcileError};
use std::io::Write;

const CLUSTER: &str = r#"
metadata:
  name: demo
  region: eu-west-1
  account_id: "123456789012"
  environment: production
vpc:
  cidr: 10.0.0.0/16
  high_availability: true
dns:
  root_domain: example.com
databases:
  - name: orders
  - name: billing
    instance_class: db.r6g.large
    storage_gb: 100
"#;

#[test]
fn cluster_manifest_parses_with_defaults() {
  let decl: ClusterDeclaration = parse_declaration(CLUSTER).expect("valid manifest");
  assert_eq!(decl.metadata.environment, Environment::Production);
  assert_eq!(decl.databases.len(), 2);
  assert_eq!(decl.database("orders").unwrap().instance_class, "db.t3.micro");
  assert_eq!(decl.database("orders").unwrap().storage_gb, 20);
  assert_eq!(decl.database("billing").unwrap().storage_gb, 100);

  let id = decl.identity();
  assert_eq!(id.region, "eu-west-1");
  assert_eq!(id.account_id, "123456789012");
  assert_eq!(id.cluster_name, "demo");
  decl.validate().expect("declaration trait agrees");
}

#[test]
fn unknown_fields_are_rejected() {
  let text = CLUSTER.replace("  high_availability: true", "  high_availability: true\n  flavour: large");
  let err = parse_declaration::<ClusterDeclaration>(&text).unwrap_err();
  assert!(matches!(err, DomainError::SerializationError(_)));
}

#[test]
fn semantic_errors_are_validation_errors() {
  let cases = [CLUSTER.replace("123456789012", "1234"),
               CLUSTER.replace("10.0.0.0/16", "10.0.0.0/8"),
               CLUSTER.replace("eu-west-1", "europe"),
               CLUSTER.replace("example.com", "localhost"),
               CLUSTER.replace("name: billing", "name: orders"),
               CLUSTER.replace("name: demo", "name: Demo")];
  for text in cases.iter() {
    let err = parse_declaration::<ClusterDeclaration>(text).unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)), "{:?}", err);
  }
}

#[test]
fn domain_errors_map_to_reconcile_validation() {
  let err: ReconcileError = DomainError::ValidationError("x".into()).into();
  assert!(matches!(err, ReconcileError::Validation(_)));
}

#[test]
fn json_manifests_are_accepted() {
  let text = r#"{"metadata":{"name":"web","namespace":"shop"},
                 "cluster":{"name":"demo","region":"eu-west-1","account_id":"123456789012"},
                 "image":"ghcr.io/acme/web:1.2.3","port":8080,"replicas":3,
                 "subdomain":"shop","postgres":"orders"}"#;
  let app: ApplicationDeclaration = parse_declaration(text).expect("json is yaml");
  assert_eq!(app.key(), "shop/web");
  assert_eq!(app.identity().cluster_name, "demo");
  assert_eq!(app.postgres.as_deref(), Some("orders"));
}

#[test]
fn application_ranges_are_checked() {
  let base = "metadata:\n  name: web\ncluster:\n  name: demo\n  region: eu-west-1\n  account_id: \"123456789012\"\nimage: nginx\n";
  let ok: ApplicationDeclaration = parse_declaration(&format!("{}port: 80\n", base)).unwrap();
  assert_eq!(ok.replicas, 1);
  assert_eq!(ok.metadata.namespace, "default");

  assert!(parse_declaration::<ApplicationDeclaration>(&format!("{}port: 0\n", base)).is_err());
  assert!(parse_declaration::<ApplicationDeclaration>(&format!("{}port: 80\nreplicas: 0\n", base)).is_err());
  assert!(parse_declaration::<ApplicationDeclaration>(&format!("{}port: 80\nreplicas: 21\n", base)).is_err());
  assert!(parse_declaration::<ApplicationDeclaration>(&format!("{}port: 80\nsubdomain: Bad_Sub\n", base)).is_err());
}

#[test]
fn manifests_load_from_files() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("cluster.yaml");
  std::fs::File::create(&path).unwrap().write_all(CLUSTER.as_bytes()).unwrap();

  let decl: ClusterDeclaration = load_declaration(path.to_str().unwrap()).unwrap();
  assert_eq!(decl.metadata.name, "demo");

  let missing = load_declaration::<ClusterDeclaration>(dir.path().join("nope.yaml").to_str().unwrap());
  assert!(matches!(missing, Err(DomainError::IoError(_))));
}
