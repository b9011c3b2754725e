use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const ACCOUNT: &str = "111111111111";

pub const STACK_KDL: &str = r#"
stack "InfraStack"

env region="us-west-2"

service "api1" {
    image "api1" tag="latest"
    port 5000
    path "/api1*"
    priority 1
}

service "api2" {
    image "api2" tag="latest"
    port 6001
    path "/api2*"
    priority 2
}

frontend {
    assets "../frontend"
    exclude "*.map"
}
"#;

/// `<root>/infra/stack.kdl` と `<root>/frontend/` を持つ一時プロジェクト
pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let project = Self { root };
        fs::create_dir_all(project.infra()).unwrap();
        fs::create_dir_all(project.config_dir()).unwrap();
        project
    }

    /// スタックファイルとフロントエンドを書き込んだプロジェクト
    pub fn with_stack() -> Self {
        let project = Self::new();
        project.write_stack_kdl(STACK_KDL);
        project.write_frontend("index.html", "<h1>hello</h1>");
        project.write_frontend("app.js.map", "{}");
        project
    }

    pub fn write_stack_kdl(&self, content: &str) {
        fs::write(self.infra().join("stack.kdl"), content).unwrap();
    }

    pub fn write_frontend(&self, name: &str, content: &str) {
        let path = self.path().join("frontend").join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn infra(&self) -> PathBuf {
        self.path().join("infra")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.path().join("config")
    }

    /// ローカルデプロイでバケットに置かれたファイル
    #[allow(dead_code)]
    pub fn bucket_files(&self) -> Vec<PathBuf> {
        let buckets = self.infra().join(".edgestack").join("buckets");
        let mut files = Vec::new();
        if buckets.exists() {
            collect(&buckets, &mut files);
        }
        files
    }

    /// ユーザー設定と環境変数から切り離した edgestack コマンド
    pub fn cmd(&self, dir: &Path) -> Command {
        let mut cmd = Command::cargo_bin("edgestack").unwrap();
        cmd.current_dir(dir)
            .env("EDGESTACK_CONFIG_DIR", self.config_dir())
            .env("NO_COLOR", "1")
            .env_remove("CDK_DEFAULT_ACCOUNT")
            .env_remove("EDGESTACK_PROJECT_ROOT")
            .env_remove("EDGESTACK_STACK_PATH")
            .env_remove("EDGESTACK_STAGE")
            .env_remove("RUST_LOG");
        cmd
    }
}

fn collect(dir: &Path, files: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(&path, files);
        } else {
            files.push(path);
        }
    }
}
