use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;

/// Version of `DEFAULT_DEPLOY_SCRIPT`. Bump it whenever the script or the
/// job skeleton changes so that new job names are generated.
pub const DEFAULT_DEPLOY_SCRIPT_VERSION: u32 = 1;

/// One string parameter declared by a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_value: String,
}

impl ParamDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            default_value: String::new(),
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = value.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Versioned, parameterized job script. Renders to a backend job definition
/// pinned to one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTemplate {
    params: Vec<ParamDef>,
    body: String,
    version: u32,
}

impl ScriptTemplate {
    /// `params` are declared after the environment parameters every deploy
    /// job receives (`RUN_ENV`, `S3GET_URL`, `S3ENV_VAR`). Repeated names keep
    /// their first declaration.
    pub fn new(params: Vec<ParamDef>, body: impl Into<String>, version: u32) -> Self {
        let mut seen = HashSet::new();
        let params = base_params()
            .into_iter()
            .chain(params)
            .filter(|p| seen.insert(p.name.clone()))
            .collect();

        Self {
            params,
            body: body.into(),
            version,
        }
    }

    /// The stock package deploy script: fetch a tgz from the artifact store,
    /// unpack it into `TARGET_PATH`, then run `RUN_CMD` with `ENV_VAR` exported.
    pub fn default_deploy() -> Self {
        Self::new(
            Self::default_deploy_params(),
            DEFAULT_DEPLOY_SCRIPT,
            DEFAULT_DEPLOY_SCRIPT_VERSION,
        )
    }

    /// Service parameters consumed by `DEFAULT_DEPLOY_SCRIPT`.
    pub fn default_deploy_params() -> Vec<ParamDef> {
        vec![
            ParamDef::new("PKG_URL").with_description("artifact store key of the package"),
            ParamDef::new("TARGET_PATH").with_description("install directory on the node"),
            ParamDef::new("RUN_CMD").with_description("script run from TARGET_PATH"),
            ParamDef::new("ENV_VAR").with_description("KEY=VALUE pairs exported before RUN_CMD"),
        ]
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn params(&self) -> &[ParamDef] {
        &self.params
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub fn declares(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    /// Render the job definition document for `node_name`.
    pub fn render(&self, node_name: &str) -> Result<String, DeployError> {
        if node_name.trim().is_empty() {
            return Err(DeployError::Template("node name must not be empty".into()));
        }
        for param in &self.params {
            if !is_shell_identifier(&param.name) {
                return Err(DeployError::Template(format!(
                    "invalid parameter name '{}'",
                    param.name
                )));
            }
        }

        let mut definitions = String::new();
        for param in &self.params {
            // Writing into a String cannot fail.
            let _ = write!(
                definitions,
                "        <hudson.model.StringParameterDefinition>\n\
                 \x20         <name>{}</name>\n\
                 \x20         <description>{}</description>\n\
                 \x20         <defaultValue>{}</defaultValue>\n\
                 \x20         <trim>true</trim>\n\
                 \x20       </hudson.model.StringParameterDefinition>\n",
                xml_escape(&param.name),
                xml_escape(&param.description),
                xml_escape(&param.default_value),
            );
        }

        Ok(JOB_XML_SKELETON
            .replace("{{PARAMETER_DEFINITIONS}}", &definitions)
            .replace("{{ASSIGNED_NODE}}", &xml_escape(node_name))
            .replace("{{SCRIPT}}", &cdata_safe(&self.body)))
    }
}

fn base_params() -> Vec<ParamDef> {
    vec![
        ParamDef::new("RUN_ENV")
            .with_default("dev")
            .with_description("deployment environment"),
        ParamDef::new("S3GET_URL").with_description("download URL of the fetcher tool"),
        ParamDef::new("S3ENV_VAR").with_description("artifact store credentials as KEY=VALUE pairs"),
    ]
}

fn is_shell_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// A literal `]]>` would close the CDATA section early; split it across two.
fn cdata_safe(s: &str) -> String {
    s.replace("]]>", "]]]]><![CDATA[>")
}

const JOB_XML_SKELETON: &str = r#"<?xml version='1.1' encoding='UTF-8'?>
<project>
  <actions/>
  <description></description>
  <keepDependencies>false</keepDependencies>
  <properties>
    <hudson.model.ParametersDefinitionProperty>
      <parameterDefinitions>
{{PARAMETER_DEFINITIONS}}      </parameterDefinitions>
    </hudson.model.ParametersDefinitionProperty>
  </properties>
  <scm class="hudson.scm.NullSCM"/>
  <assignedNode>{{ASSIGNED_NODE}}</assignedNode>
  <canRoam>false</canRoam>
  <disabled>false</disabled>
  <blockBuildWhenDownstreamBuilding>false</blockBuildWhenDownstreamBuilding>
  <blockBuildWhenUpstreamBuilding>false</blockBuildWhenUpstreamBuilding>
  <triggers/>
  <concurrentBuild>false</concurrentBuild>
  <builders>
    <hudson.tasks.Shell>
      <command><![CDATA[{{SCRIPT}}]]></command>
    </hudson.tasks.Shell>
  </builders>
  <publishers/>
  <buildWrappers/>
</project>"#;

pub const DEFAULT_DEPLOY_SCRIPT: &str = r#"#!/bin/bash -il
# Provided by the backend: NODE_NAME
# Environment: RUN_ENV, S3GET_URL, S3ENV_VAR
# Service: PKG_URL, TARGET_PATH, RUN_CMD, ENV_VAR

S3GET_PATH="/tmp/s3get"
mkdir -p /tmp

# fetch the artifact tool once per node; concurrent jobs serialize on the lock
if [[ ! -f ${S3GET_PATH} ]]; then
    echo "deploy: downloading s3get..."
    ( flock -x 42;
      if [[ ! -f ${S3GET_PATH} ]]; then
        curl -s --insecure ${S3GET_URL} -o ${S3GET_PATH}.tgz
        tar -xzf ${S3GET_PATH}.tgz -C $(dirname ${S3GET_PATH}.tgz)
        EXIT_CODE=$?
        if [[ EXIT_CODE -ne 0 ]]; then
            echo "deploy: download s3get failed ${S3GET_URL}..."
            rm -f ${S3GET_PATH}.tgz
            rm -f ${S3GET_PATH}
            exit 1
        fi
        chmod +x ${S3GET_PATH}
      fi
    ) 42>"${S3GET_PATH}.lock"
fi

mkdir -p ${TARGET_PATH}
DATENAME=$(date +%Y%m%d%H%M%S-%N)
TMP_PKG_DIR=${TARGET_PATH}/tmppkg${DATENAME}
mkdir ${TMP_PKG_DIR}

export ${S3ENV_VAR}
${S3GET_PATH} ${PKG_URL} ${TMP_PKG_DIR}.tgz
tar -xzf ${TMP_PKG_DIR}.tgz -C ${TMP_PKG_DIR}
EXIT_CODE=$?
if [[ EXIT_CODE -ne 0 ]]; then
    echo "deploy: download package failed ${PKG_URL}..."
    rm -rf ${TMP_PKG_DIR} ${TMP_PKG_DIR}.tgz
    exit 1
fi
rm -f ${TMP_PKG_DIR}.tgz

rsync -av ${TMP_PKG_DIR}/ ${TARGET_PATH}
rm -rf ${TMP_PKG_DIR}

cd ${TARGET_PATH}

export ${ENV_VAR}
/bin/bash ${RUN_CMD}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_deploy_declares_base_then_service_params() {
        let script = ScriptTemplate::default_deploy();
        let names: Vec<_> = script.parameter_names().collect();
        assert_eq!(
            names,
            vec!["RUN_ENV", "S3GET_URL", "S3ENV_VAR", "PKG_URL", "TARGET_PATH", "RUN_CMD", "ENV_VAR"]
        );
        assert_eq!(script.version(), DEFAULT_DEPLOY_SCRIPT_VERSION);
    }

    #[test]
    fn duplicate_declarations_keep_first() {
        let script = ScriptTemplate::new(
            vec![ParamDef::new("RUN_ENV").with_default("prod"), ParamDef::new("EXTRA")],
            "echo hi",
            7,
        );
        let run_env: Vec<_> = script.params().iter().filter(|p| p.name == "RUN_ENV").collect();
        assert_eq!(run_env.len(), 1);
        assert_eq!(run_env[0].default_value, "dev");
        assert!(script.declares("EXTRA"));
    }

    #[test]
    fn render_pins_node_and_embeds_script() {
        let doc = ScriptTemplate::default_deploy().render("10.0.0.5").unwrap();
        assert!(doc.contains("<assignedNode>10.0.0.5</assignedNode>"));
        assert!(doc.contains("<name>PKG_URL</name>"));
        assert!(doc.contains("<defaultValue>dev</defaultValue>"));
        assert!(doc.contains("<![CDATA[#!/bin/bash -il"));
        assert!(!doc.contains("{{"));
    }

    #[test]
    fn render_escapes_markup() {
        let script = ScriptTemplate::new(
            vec![ParamDef::new("A").with_default("<x & y>")],
            "echo ']]>'",
            1,
        );
        let doc = script.render("node<1>").unwrap();
        assert!(doc.contains("<defaultValue>&lt;x &amp; y&gt;</defaultValue>"));
        assert!(doc.contains("<assignedNode>node&lt;1&gt;</assignedNode>"));
        assert!(doc.contains("echo ']]]]><![CDATA[>'"));
    }

    #[test]
    fn render_rejects_bad_input() {
        let script = ScriptTemplate::new(vec![ParamDef::new("BAD-NAME")], "true", 1);
        assert!(matches!(script.render("n"), Err(DeployError::Template(_))));
        assert!(matches!(
            ScriptTemplate::default_deploy().render(" "),
            Err(DeployError::Template(_))
        ));
    }
}
