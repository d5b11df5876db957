//! 基于命令行工具的镜像运行时
//!
//! 通过 Docker 兼容的 CLI（docker / nerdctl / podman）查询和删除镜像

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

use super::{ImageInspection, ImageRuntime, RuntimeError};

/// 运行时报告镜像不存在时的错误信息
const NO_SUCH_IMAGE: &str = "no such image";

/// `image inspect` 输出中用到的字段
#[derive(Debug, Deserialize)]
struct InspectedImage {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Size", default)]
    size: i64,
}

/// 命令行镜像运行时
#[derive(Debug, Clone)]
pub struct CliImageRuntime {
    /// 可执行文件
    binary: PathBuf,
    /// 查询超时时间
    inspect_timeout: Duration,
}

impl CliImageRuntime {
    pub fn new(binary: impl Into<PathBuf>, inspect_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            inspect_timeout,
        }
    }

    /// 执行子命令，超时后子进程随future一起被kill
    async fn run(&self, args: &[&str], limit: Duration) -> Result<Output, RuntimeError> {
        let command = self.describe(args);
        tracing::debug!("Running runtime command: {}", command);

        let child = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(limit, child).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(RuntimeError::Timeout {
                operation: command,
                duration_seconds: limit.as_secs(),
            }),
        }
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary.display(), args.join(" "))
    }
}

#[async_trait]
impl ImageRuntime for CliImageRuntime {
    async fn inspect_image(&self, reference: &str) -> Result<ImageInspection, RuntimeError> {
        let args = inspect_args(reference);
        let output = self.run(&args, self.inspect_timeout).await?;

        if !output.status.success() {
            return Err(classify_failure(
                &self.describe(&args),
                reference,
                &String::from_utf8_lossy(&output.stderr),
            ));
        }

        parse_inspect_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn remove_image(&self, identity: &str, timeout: Duration) -> Result<(), RuntimeError> {
        let args = remove_args(identity);
        let output = self.run(&args, timeout).await?;

        if !output.status.success() {
            return Err(classify_failure(
                &self.describe(&args),
                identity,
                &String::from_utf8_lossy(&output.stderr),
            ));
        }

        Ok(())
    }
}

/// `--` 之后的参数不会被当作选项，以 `-` 开头的引用也按镜像名处理
fn inspect_args(reference: &str) -> [&str; 4] {
    ["image", "inspect", "--", reference]
}

fn remove_args(identity: &str) -> [&str; 3] {
    ["rmi", "--", identity]
}

/// 解析 `image inspect` 的JSON数组输出，取第一个元素
pub fn parse_inspect_output(stdout: &str) -> Result<ImageInspection, RuntimeError> {
    let images: Vec<InspectedImage> = serde_json::from_str(stdout).map_err(|e| RuntimeError::Parse {
        message: e.to_string(),
    })?;

    let image = images.into_iter().next().ok_or_else(|| RuntimeError::Parse {
        message: "inspect returned no images".to_string(),
    })?;

    if image.id.is_empty() {
        return Err(RuntimeError::Parse {
            message: "inspect returned an empty image id".to_string(),
        });
    }

    Ok(ImageInspection {
        id: image.id,
        size: image.size,
    })
}

/// 把失败的命令输出转换为运行时错误，区分出"镜像不存在"
pub fn classify_failure(command: &str, identity: &str, stderr: &str) -> RuntimeError {
    if stderr.to_lowercase().contains(NO_SUCH_IMAGE) {
        RuntimeError::NoSuchImage(identity.to_string())
    } else {
        RuntimeError::Command {
            command: command.to_string(),
            message: stderr.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inspect_output() {
        let stdout = r#"[{"Id":"sha256:4f2a","RepoTags":["app:latest"],"Size":7340032}]"#;
        let inspection = parse_inspect_output(stdout).unwrap();
        assert_eq!(inspection.id, "sha256:4f2a");
        assert_eq!(inspection.size, 7340032);
    }

    #[test]
    fn test_parse_inspect_output_empty() {
        assert!(matches!(parse_inspect_output("[]"), Err(RuntimeError::Parse { .. })));
        assert!(matches!(parse_inspect_output("not json"), Err(RuntimeError::Parse { .. })));
    }

    #[test]
    fn test_classify_failure() {
        let err = classify_failure("docker rmi app:latest", "app:latest", "Error: No such image: app:latest\n");
        assert!(err.is_no_such_image());

        let err = classify_failure(
            "docker rmi app:latest",
            "app:latest",
            "Error response from daemon: conflict: unable to remove repository reference\n",
        );
        match err {
            RuntimeError::Command { command, message } => {
                assert_eq!(command, "docker rmi app:latest");
                assert!(message.starts_with("Error response from daemon"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_references_are_never_parsed_as_flags() {
        assert_eq!(inspect_args("--help"), ["image", "inspect", "--", "--help"]);
        assert_eq!(remove_args("-f"), ["rmi", "--", "-f"]);

        let runtime = CliImageRuntime::new("docker", Duration::from_secs(5));
        assert_eq!(runtime.describe(&remove_args("app:latest")), "docker rmi -- app:latest");
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let runtime = CliImageRuntime::new("/nonexistent/edge-image-runtime", Duration::from_secs(5));
        let err = runtime.inspect_image("app:latest").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Io(_)));
    }
}
