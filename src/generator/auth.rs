//! Authentication blocks for the different wire protocols.

use std::{fmt::Write as _, sync::LazyLock};

use regex::Regex;
use snafu::OptionExt;
use toml::{Table, Value};

use super::{GeneratorError, InvalidRoleArnSnafu, Options, elements::table};
use crate::{
    api::{
        AwsAuthentication, BearerToken, HttpAuthentication, SecretKey,
        constants::{AWS_CREDENTIALS_FILE, SERVICE_ACCOUNT_TOKEN_PATH},
    },
    secrets::{Secrets, secret_path, secret_reference},
};

static ROLE_ARN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"arn:aws(-\w+)?:(iam|sts)::\d{12}:role/\S+").expect("role ARN regex is valid")
});

/// Extracts a role ARN from either a bare value or a `[profile]` shaped credentials file.
pub fn parse_role_arn(text: &str) -> Option<String> {
    ROLE_ARN.find(text).map(|m| m.as_str().to_string())
}

/// Renders a credentials file profile assuming `role_arn` with a web identity token.
pub fn format_role_arn(profile: &str, role_arn: &str, token_file: &str) -> String {
    format!("[{profile}]\nrole_arn = {role_arn}\nweb_identity_token_file = {token_file}\n")
}

fn token_reference(token: &BearerToken, options: &Options) -> String {
    match token {
        BearerToken::Secret { secret } => secret_reference(secret),
        BearerToken::ServiceAccount => {
            secret_reference(&SecretKey::new(options.token_secret.as_str(), "token"))
        }
    }
}

/// `auth` block for HTTP based sinks.
pub fn http_auth(auth: &HttpAuthentication, options: &Options) -> Option<Table> {
    if let Some(token) = &auth.token {
        return Some(table([
            ("strategy", "bearer".into()),
            ("token", token_reference(token, options).into()),
        ]));
    }
    let username = auth.username.as_ref()?;
    let mut block = table([
        ("strategy", "basic".into()),
        ("user", secret_reference(username).into()),
    ]);
    if let Some(password) = &auth.password {
        block.insert("password".into(), secret_reference(password).into());
    }
    Some(block)
}

/// `Authorization` header value for sinks without a bearer auth strategy.
pub fn bearer_header(auth: &HttpAuthentication, options: &Options) -> Option<String> {
    auth.token
        .as_ref()
        .map(|token| format!("Bearer {}", token_reference(token, options)))
}

/// Profile name used for an output in the shared credentials file.
pub fn aws_profile(output_id: &str) -> String {
    output_id.to_string()
}

/// `auth` block for Cloudwatch and S3.
///
/// Access keys are referenced through the secret backend and may carry an inline assume-role.
/// Web identity roles point at the generated credentials file, which also holds any
/// assume-role chain.
pub fn aws_auth(output_id: &str, auth: &AwsAuthentication) -> Table {
    match auth {
        AwsAuthentication::AccessKey {
            access_key_id,
            access_key_secret,
            assume_role,
        } => {
            let mut block = table([
                ("access_key_id", secret_reference(access_key_id).into()),
                ("secret_access_key", secret_reference(access_key_secret).into()),
            ]);
            if let Some(assume) = assume_role {
                block.insert("assume_role".into(), secret_reference(&assume.role_arn).into());
                if let Some(external_id) = &assume.external_id {
                    block.insert("external_id".into(), secret_reference(external_id).into());
                }
            }
            block
        }
        AwsAuthentication::IamRole { .. } => table([
            ("credentials_file", AWS_CREDENTIALS_FILE.into()),
            ("profile", Value::String(aws_profile(output_id))),
        ]),
    }
}

fn role_arn(output_id: &str, key: &SecretKey, secrets: &Secrets) -> Result<String, GeneratorError> {
    secrets
        .get_string(key)
        .as_deref()
        .and_then(parse_role_arn)
        .context(InvalidRoleArnSnafu {
            output: output_id,
            secret: format!("{}/{}", key.secret_name, key.key),
        })
}

/// Appends the credentials file profiles for one output using a web identity role.
///
/// Returns without writing for access-key outputs.
pub fn write_aws_credentials(
    out: &mut String,
    output_id: &str,
    auth: &AwsAuthentication,
    secrets: &Secrets,
) -> Result<(), GeneratorError> {
    let AwsAuthentication::IamRole {
        role_arn: arn_key,
        token,
        assume_role,
    } = auth
    else {
        return Ok(());
    };
    let token_file = match token {
        BearerToken::Secret { secret } => secret_path(&secret.secret_name, &secret.key),
        BearerToken::ServiceAccount => SERVICE_ACCOUNT_TOKEN_PATH.to_string(),
    };
    let arn = role_arn(output_id, arn_key, secrets)?;
    let profile = aws_profile(output_id);

    match assume_role {
        None => out.push_str(&format_role_arn(&profile, &arn, &token_file)),
        Some(assume) => {
            let source = format!("{profile}_web_identity");
            out.push_str(&format_role_arn(&source, &arn, &token_file));
            let target = role_arn(output_id, &assume.role_arn, secrets)?;
            let _ = write!(out, "[{profile}]\nrole_arn = {target}\nsource_profile = {source}\n");
            if let Some(external_id) = assume
                .external_id
                .as_ref()
                .and_then(|key| secrets.get_string(key))
            {
                let _ = writeln!(out, "external_id = {external_id}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;
    use crate::api::AwsAssumeRole;

    const ARN: &str = "arn:aws:iam::123456789012:role/foo";

    #[test]
    fn role_arn_from_raw_value_and_credentials() {
        assert_eq!(parse_role_arn(ARN).as_deref(), Some(ARN));
        assert_eq!(
            parse_role_arn(&format_role_arn("default", ARN, "/var/run/token")).as_deref(),
            Some(ARN)
        );
        assert_eq!(
            parse_role_arn("arn:aws-us-gov:sts::123456789012:role/a/b").as_deref(),
            Some("arn:aws-us-gov:sts::123456789012:role/a/b")
        );
        assert_eq!(parse_role_arn("arn:aws:iam::1234:role/short"), None);
    }

    #[test]
    fn http_auth_prefers_token() {
        let auth = HttpAuthentication {
            username: Some(SecretKey::new("creds", "username")),
            password: Some(SecretKey::new("creds", "password")),
            token: None,
        };
        let block = http_auth(&auth, &Options::default()).unwrap();
        assert_eq!(block["strategy"].as_str(), Some("basic"));
        assert_eq!(
            block["password"].as_str(),
            Some("SECRET[kubernetes_secret.creds/password]")
        );

        let auth = HttpAuthentication {
            token: Some(BearerToken::ServiceAccount),
            ..auth
        };
        let block = http_auth(&auth, &Options::default()).unwrap();
        assert_eq!(block["strategy"].as_str(), Some("bearer"));
        assert_eq!(
            block["token"].as_str(),
            Some("SECRET[kubernetes_secret.logcollector-token/token]")
        );
    }

    #[test]
    fn iam_role_with_assume_role_chains_profiles() {
        let mut secrets = Secrets::new();
        secrets.insert(
            "cw",
            BTreeMap::from([
                ("role_arn".to_string(), ARN.as_bytes().to_vec()),
                (
                    "assume".to_string(),
                    b"arn:aws:iam::210987654321:role/target".to_vec(),
                ),
                ("external".to_string(), b"my-id".to_vec()),
            ]),
        );
        let auth = AwsAuthentication::IamRole {
            role_arn: SecretKey::new("cw", "role_arn"),
            token: BearerToken::ServiceAccount,
            assume_role: Some(AwsAssumeRole {
                role_arn: SecretKey::new("cw", "assume"),
                external_id: Some(SecretKey::new("cw", "external")),
            }),
        };
        let mut out = String::new();
        write_aws_credentials(&mut out, "output_cw", &auth, &secrets).unwrap();
        assert!(out.starts_with("[output_cw_web_identity]\n"));
        assert!(out.contains("[output_cw]\nrole_arn = arn:aws:iam::210987654321:role/target\nsource_profile = output_cw_web_identity\n"));
        assert!(out.ends_with("external_id = my-id\n"));

        let block = aws_auth("output_cw", &auth);
        assert_eq!(block["profile"].as_str(), Some("output_cw"));
    }

    #[test]
    fn missing_role_arn_is_an_error() {
        let auth = AwsAuthentication::IamRole {
            role_arn: SecretKey::new("cw", "role_arn"),
            token: BearerToken::ServiceAccount,
            assume_role: None,
        };
        let error = write_aws_credentials(&mut String::new(), "output_cw", &auth, &Secrets::new())
            .unwrap_err();
        assert!(matches!(error, GeneratorError::InvalidRoleArn { .. }));
    }

    proptest! {
        #[test]
        fn role_arn_round_trips(arn in r"arn:aws(-[a-z]{2,8})?:(iam|sts)::[0-9]{12}:role/[A-Za-z0-9_+=,.@/-]{1,40}") {
            let text = format_role_arn("default", &arn, "/var/run/token");
            prop_assert_eq!(parse_role_arn(&text), Some(arn));
        }
    }
}
