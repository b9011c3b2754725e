use crate::GlobalArgs;
use crate::utils::{self, Workspace};
use edgestack_cloud::CloudError;

pub async fn handle(global: &GlobalArgs, json: bool) -> anyhow::Result<()> {
    let workspace = Workspace::load(global)?;
    let provider = workspace.provider()?;

    let outputs = match provider.outputs().await {
        Ok(outputs) => outputs,
        Err(CloudError::NotDeployed(stack)) => {
            anyhow::bail!(
                "スタック '{}' はデプロイされていません\n`edgestack deploy --yes` を実行してください",
                stack
            );
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
    } else {
        utils::print_outputs(&workspace.stack().name, &outputs);
    }
    Ok(())
}
