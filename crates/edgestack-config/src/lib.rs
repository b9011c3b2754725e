pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// ユーザー設定ファイル名
pub const SETTINGS_FILE: &str = "settings.yaml";

/// ユーザー設定（~/.config/edgestack/settings.yaml）
///
/// ```yaml
/// default_account: "111111111111"
/// output_dir: edgestack.out
/// state_dir: .edgestack
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// コンテキスト・環境変数で指定されなかった場合のアカウントID
    pub default_account: Option<String>,
    /// synth の出力先（プロジェクトルート相対）
    pub output_dir: Option<PathBuf>,
    /// ローカルデプロイ状態の保存先（プロジェクトルート相対）
    pub state_dir: Option<PathBuf>,
}

impl Settings {
    pub const DEFAULT_OUTPUT_DIR: &'static str = "edgestack.out";
    pub const DEFAULT_STATE_DIR: &'static str = ".edgestack";

    /// ユーザー設定ディレクトリから読み込む（ファイルがなければ既定値）
    pub fn load() -> Result<Self> {
        match config_dir_path() {
            Some(dir) => Self::load_from(&dir.join(SETTINGS_FILE)),
            None => Ok(Self::default()),
        }
    }

    /// 指定ファイルから読み込む（ファイルがなければ既定値）
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        // 空ファイルは既定値
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| ConfigError::InvalidSettings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 指定ファイルに保存
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self).map_err(|source| ConfigError::InvalidSettings {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_OUTPUT_DIR))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_STATE_DIR))
    }
}

/// 設定ディレクトリのパス（作成はしない）
///
/// EDGESTACK_CONFIG_DIR が設定されていればそれを優先します。
pub fn config_dir_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("EDGESTACK_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|dir| dir.join("edgestack"))
}

/// edgestackの設定ディレクトリを取得（なければ作成）
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = config_dir_path().ok_or(ConfigError::ConfigDirNotFound)?;

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// スタック定義ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 EDGESTACK_STACK_PATH (直接パス指定)
/// 2. カレントディレクトリ: stack.local.kdl, stack.kdl
/// 3. ./.edgestack/ ディレクトリ内: 同様の順序
/// 4. ~/.config/edgestack/stack.kdl (グローバル設定)
pub fn find_stack_file() -> Result<PathBuf> {
    if let Ok(stack_path) = std::env::var("EDGESTACK_STACK_PATH") {
        let path = PathBuf::from(stack_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    let candidates = ["stack.local.kdl", "stack.kdl"];

    for filename in &candidates {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let hidden_dir = current_dir.join(".edgestack");
    if hidden_dir.is_dir() {
        for filename in &candidates {
            let path = hidden_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = config_dir_path() {
        let global = config_dir.join("stack.kdl");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::StackFileNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_settings_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.yaml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.output_dir(), PathBuf::from("edgestack.out"));
        assert_eq!(settings.state_dir(), PathBuf::from(".edgestack"));
    }

    #[test]
    fn test_settings_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        fs::write(
            &path,
            "default_account: \"111111111111\"\noutput_dir: build/cloud\n",
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.default_account.as_deref(), Some("111111111111"));
        assert_eq!(settings.output_dir(), PathBuf::from("build/cloud"));
        assert_eq!(settings.state_dir(), PathBuf::from(".edgestack"));
    }

    #[test]
    fn test_settings_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        fs::write(&path, "default_account: [unterminated").unwrap();

        let result = Settings::load_from(&path);
        assert!(matches!(result, Err(ConfigError::InvalidSettings { .. })));
    }

    #[test]
    fn test_settings_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/settings.yaml");
        let settings = Settings {
            default_account: Some("222222222222".to_string()),
            ..Default::default()
        };

        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    #[serial]
    fn test_settings_load_from_config_dir_env() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE),
            "default_account: \"333333333333\"\n",
        )
        .unwrap();

        temp_env::with_var("EDGESTACK_CONFIG_DIR", Some(dir.path()), || {
            let settings = Settings::load().unwrap();
            assert_eq!(settings.default_account.as_deref(), Some("333333333333"));
        });
    }

    #[test]
    #[serial]
    fn test_get_config_dir_creates() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("edgestack");

        temp_env::with_var("EDGESTACK_CONFIG_DIR", Some(&target), || {
            let config_dir = get_config_dir().unwrap();
            assert_eq!(config_dir, target);
            assert!(config_dir.exists());
        });
    }

    #[test]
    #[serial]
    fn test_find_stack_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stack.kdl"), "// global").unwrap();
        fs::write(temp_dir.path().join("stack.local.kdl"), "// local").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_stack_file().unwrap();
        std::env::set_current_dir(original_dir).unwrap();

        // stack.local.kdl が優先される
        assert!(result.ends_with("stack.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_hidden_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let hidden = temp_dir.path().join(".edgestack");
        fs::create_dir(&hidden).unwrap();
        fs::write(hidden.join("stack.kdl"), "// hidden").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_stack_file().unwrap();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.ends_with(".edgestack/stack.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_stack_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let stack_path = temp_dir.path().join("custom.kdl");
        fs::write(&stack_path, "// custom").unwrap();

        temp_env::with_var("EDGESTACK_STACK_PATH", Some(&stack_path), || {
            assert_eq!(find_stack_file().unwrap(), stack_path);
        });
    }

    #[test]
    #[serial]
    fn test_find_stack_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_vars(
            [
                ("EDGESTACK_CONFIG_DIR", Some(config_dir.path().as_os_str())),
                ("EDGESTACK_STACK_PATH", None),
            ],
            find_stack_file,
        );
        std::env::set_current_dir(original_dir).unwrap();

        assert!(matches!(result, Err(ConfigError::StackFileNotFound)));
    }
}
