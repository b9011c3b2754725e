use super::*;
use crate::assembly::CloudAssembly;
use edgestack_core::StackError;
use regex::Regex;
use std::fs as stdfs;
use tempfile::TempDir;

struct Fixture {
    _root: TempDir,
    state_dir: PathBuf,
    assembly_dir: PathBuf,
    assets_dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let assets_dir = root.path().join("frontend");
        stdfs::create_dir_all(assets_dir.join("css")).unwrap();
        stdfs::write(assets_dir.join("index.html"), "<h1>hello</h1>").unwrap();
        stdfs::write(assets_dir.join("css/site.css"), "body {}").unwrap();
        Self {
            state_dir: root.path().join(".edgestack"),
            assembly_dir: root.path().join("cdk.out"),
            assets_dir,
            _root: root,
        }
    }

    fn provider(&self, stack: &StackDefinition) -> LocalProvider {
        LocalProvider::for_stack(stack, &self.state_dir, &self.assembly_dir).unwrap()
    }

    fn desired(&self, stack: &StackDefinition) -> ResourceSet {
        let assembly = CloudAssembly::build(stack, Some(self.assets_dir.as_path()), &self.assembly_dir).unwrap();
        ResourceSet::from_template(&stack.name, &assembly.template)
    }
}

fn stack() -> StackDefinition {
    let mut stack = StackDefinition::reference();
    stack.env.account = Some("111111111111".to_string());
    stack
}

async fn deploy(provider: &LocalProvider, desired: &ResourceSet) -> ApplyResult {
    let plan = provider.plan(desired).await.unwrap();
    provider.apply(&plan).await.unwrap()
}

async fn bucket_name(provider: &LocalProvider) -> String {
    let state = provider.get_state().await.unwrap();
    state
        .iter()
        .find(|(_, r)| r.resource_type == "AWS::S3::Bucket")
        .map(|(_, r)| r.id.clone())
        .unwrap()
}

#[tokio::test]
async fn test_deploy_reports_outputs() {
    let fixture = Fixture::new();
    let stack = stack();
    let provider = fixture.provider(&stack);
    let desired = fixture.desired(&stack);

    let result = deploy(&provider, &desired).await;
    assert!(result.is_success(), "{:?}", result.failed);
    assert_eq!(result.succeeded.len(), desired.resources.len());

    let outputs = provider.outputs().await.unwrap();
    let alb = Regex::new(r"^[A-Za-z0-9-]+-\d{10}\.us-west-2\.elb\.amazonaws\.com$").unwrap();
    assert!(alb.is_match(&outputs["ALBDnsName"]), "{}", outputs["ALBDnsName"]);
    let cdn = Regex::new(r"^https://d[a-z0-9]{13}\.cloudfront\.net$").unwrap();
    assert!(cdn.is_match(&outputs["CloudFrontURL"]), "{}", outputs["CloudFrontURL"]);
}

#[tokio::test]
async fn test_deploy_uploads_assets_and_invalidates() {
    let fixture = Fixture::new();
    let stack = stack();
    let provider = fixture.provider(&stack);
    deploy(&provider, &fixture.desired(&stack)).await;

    let bucket = provider.bucket_dir(&bucket_name(&provider).await);
    assert_eq!(stdfs::read_to_string(bucket.join("index.html")).unwrap(), "<h1>hello</h1>");
    assert!(bucket.join("css/site.css").exists());

    let invalidations = provider.invalidations().await.unwrap();
    assert_eq!(invalidations.len(), 1);
    assert_eq!(invalidations[0].paths, vec!["/*".to_string()]);

    let state = provider.get_state().await.unwrap();
    let distribution = state
        .iter()
        .find(|(_, r)| r.resource_type == "AWS::CloudFront::Distribution")
        .map(|(_, r)| r.id.clone())
        .unwrap();
    assert_eq!(invalidations[0].distribution_id, distribution);
}

#[tokio::test]
async fn test_redeploy_is_idempotent_but_invalidates_again() {
    let fixture = Fixture::new();
    let stack = stack();
    let provider = fixture.provider(&stack);
    let desired = fixture.desired(&stack);
    deploy(&provider, &desired).await;
    let first = provider.outputs().await.unwrap();

    let plan = provider.plan(&desired).await.unwrap();
    let summary = plan.summary();
    assert_eq!(summary.create, 0);
    assert_eq!(summary.delete, 0);
    assert_eq!(summary.update, 1);
    assert_eq!(
        plan.actions_by_type(ActionType::Update)[0].resource_type,
        BUCKET_DEPLOYMENT_RESOURCE_TYPE
    );

    provider.apply(&plan).await.unwrap();
    assert_eq!(provider.outputs().await.unwrap(), first);
    assert_eq!(provider.invalidations().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_redeploy_prunes_stale_objects() {
    let fixture = Fixture::new();
    let stack = stack();
    let provider = fixture.provider(&stack);
    deploy(&provider, &fixture.desired(&stack)).await;

    let bucket = provider.bucket_dir(&bucket_name(&provider).await);
    stdfs::write(bucket.join("old.js"), "stale").unwrap();
    stdfs::remove_file(fixture.assets_dir.join("css/site.css")).unwrap();

    deploy(&provider, &fixture.desired(&stack)).await;
    assert!(bucket.join("index.html").exists());
    assert!(!bucket.join("old.js").exists());
    assert!(!bucket.join("css/site.css").exists());
}

#[tokio::test]
async fn test_removed_service_is_deleted() {
    let fixture = Fixture::new();
    let mut stack = stack();
    let provider = fixture.provider(&stack);
    deploy(&provider, &fixture.desired(&stack)).await;

    stack.services.retain(|s| s.name != "api2");
    let plan = provider.plan(&fixture.desired(&stack)).await.unwrap();
    let deleted: Vec<&str> = plan
        .actions_by_type(ActionType::Delete)
        .iter()
        .map(|a| a.id.as_str())
        .collect();
    assert!(deleted.iter().any(|id| id.starts_with("Api2Service")));
    assert!(deleted.iter().any(|id| id.starts_with("Api2Task")));
    assert!(!deleted.iter().any(|id| id.contains("Api1")), "{:?}", deleted);
    assert_eq!(plan.summary().create, 0);

    let result = provider.apply(&plan).await.unwrap();
    assert!(result.is_success(), "{:?}", result.failed);
    // the api2 log group is retained, everything else is gone
    assert_eq!(result.retained.len(), 1);
    let state = provider.get_state().await.unwrap();
    assert!(state.iter().all(|(id, _)| !id.starts_with("Api2")));
    assert!(state.iter().any(|(id, _)| id.starts_with("Api1Service")));
}

#[tokio::test]
async fn test_destroy_all_keeps_retained_resources() {
    let fixture = Fixture::new();
    let stack = stack();
    let provider = fixture.provider(&stack);
    deploy(&provider, &fixture.desired(&stack)).await;
    let bucket = provider.bucket_dir(&bucket_name(&provider).await);
    assert!(bucket.exists());

    let result = provider.destroy_all().await.unwrap();
    assert!(result.is_success(), "{:?}", result.failed);
    assert_eq!(result.retained.len(), 2);
    assert!(result.retained.iter().all(|id| id.contains("LogGroup")));
    assert!(!bucket.exists());

    assert!(provider.get_state().await.unwrap().is_empty());
    assert!(matches!(
        provider.outputs().await,
        Err(CloudError::NotDeployed(_))
    ));
}

#[tokio::test]
async fn test_destroy_all_without_deployment() {
    let fixture = Fixture::new();
    let provider = fixture.provider(&stack());
    assert!(matches!(
        provider.destroy_all().await,
        Err(CloudError::NotDeployed(_))
    ));
}

#[tokio::test]
async fn test_check_auth() {
    let fixture = Fixture::new();
    let provider = fixture.provider(&stack());
    let status = provider.check_auth().await.unwrap();
    assert!(status.authenticated);
    assert_eq!(status.account_info.as_deref(), Some("aws://111111111111/us-west-2"));

    let mut bad = stack();
    bad.env.account = Some("1234".to_string());
    let status = fixture.provider(&bad).check_auth().await.unwrap();
    assert!(!status.authenticated);
}

#[test]
fn test_for_stack_requires_account() {
    let fixture = Fixture::new();
    let result = LocalProvider::for_stack(
        &StackDefinition::reference(),
        &fixture.state_dir,
        &fixture.assembly_dir,
    );
    assert!(matches!(
        result,
        Err(CloudError::Stack(StackError::MissingAccount))
    ));
}
