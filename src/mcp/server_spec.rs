use serde::Deserialize;
use std::collections::BTreeMap;

pub const ACCESS_TOKEN_VAR: &str = "MAPBOX_ACCESS_TOKEN";

pub const DEFAULT_SERVER_COMMAND: &str = "node";
pub const DEFAULT_SERVER_ARGS: &[&str] = &["dist/index.js"];

/// How the Mapbox MCP server is started.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerLaunch {
    /// A local checkout, e.g. `node dist/index.js`
    Command { command: String, args: Vec<String> },
    /// The published image, run with `docker run -i --rm`
    Docker { image: String },
}

impl Default for ServerLaunch {
    fn default() -> Self {
        ServerLaunch::Command {
            command: DEFAULT_SERVER_COMMAND.to_string(),
            args: DEFAULT_SERVER_ARGS.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

/// Everything needed to spawn the tool server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolServerSpec {
    pub command: String,
    pub args: Vec<String>,
    /// Set on top of the inherited environment
    pub env: BTreeMap<String, String>,
}

impl ToolServerSpec {
    /// `forwarded` vars are passed to the server next to the access token.
    pub fn new<I>(access_token: &str, launch: &ServerLaunch, forwarded: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env = BTreeMap::new();
        env.insert(ACCESS_TOKEN_VAR.to_string(), access_token.to_string());
        env.extend(forwarded);

        match launch {
            ServerLaunch::Command { command, args } => Self {
                command: command.clone(),
                args: args.clone(),
                env,
            },
            ServerLaunch::Docker { image } => {
                let mut args = vec!["run".to_string(), "-i".to_string(), "--rm".to_string()];
                // `-e NAME` without a value copies it from the docker client's env
                for name in env.keys() {
                    args.push("-e".to_string());
                    args.push(name.clone());
                }
                args.push(image.clone());

                Self {
                    command: "docker".to_string(),
                    args,
                    env,
                }
            }
        }
    }

    /// Command line for logs, without any env values.
    pub fn display_command(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
