use super::{Adapter, Context, json_encoding};
use crate::{
    api::Http,
    generator::{
        GeneratorError,
        auth::http_auth,
        elements::{Element, Proxy, Sink},
        tls::output_tls,
    },
};

const DEFAULT_TIMEOUT_SECS: u32 = 10;
const METHODS: [&str; 8] = ["get", "head", "post", "put", "delete", "options", "trace", "patch"];
/// Hosts that bypass the proxy.
const NO_PROXY: [&str; 2] = ["localhost", "127.0.0.1"];

impl Http {
    fn method(&self) -> String {
        self.method
            .as_deref()
            .map(str::to_ascii_lowercase)
            .filter(|m| METHODS.contains(&m.as_str()))
            .unwrap_or_else(|| "post".to_string())
    }
}

impl Adapter for Http {
    fn adapt(&self, cx: &Context<'_>) -> Result<Vec<Element>, GeneratorError> {
        let mut sink = Sink::new(cx.id.as_str(), self.sink_type(), cx.inputs.clone())
            .with("uri", self.url.as_str())
            .with("method", self.method())
            .encoding(json_encoding())
            .tunable();

        let request = sink.request_mut();
        request.timeout_secs = Some(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS).into());
        request
            .headers
            .extend(self.headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(proxy) = self.proxy_url.as_ref().filter(|p| !p.is_empty()) {
            sink.proxy = Some(Proxy {
                enabled: true,
                http: Some(proxy.clone()),
                https: Some(proxy.clone()),
                no_proxy: NO_PROXY.iter().map(|h| h.to_string()).collect(),
            });
        }
        sink.auth = self
            .authentication
            .as_ref()
            .and_then(|auth| http_auth(auth, cx.options));
        sink.tls = output_tls(cx.output, Some(&self.url), cx.options, false);

        Ok(vec![cx.finish(sink)])
    }

    fn sink_type(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        api::{HttpAuthentication, OutputSpec, OutputTlsSpec, OutputType, SecretKey},
        generator::outputs::tests::{adapt, render},
        secrets::Secrets,
    };

    fn output(http: Http) -> OutputSpec {
        let mut output = OutputSpec::new("web", OutputType::Http);
        output.http = Some(http);
        output.tls = Some(OutputTlsSpec {
            insecure_skip_verify: true,
            ..Default::default()
        });
        output
    }

    fn http(method: Option<&str>) -> Http {
        Http {
            url: "https://logs.example.com/ingest".into(),
            method: method.map(Into::into),
            headers: BTreeMap::from([("h1".to_string(), "v1".to_string())]),
            timeout: None,
            proxy_url: Some("http://proxy.example.com:3128".into()),
            authentication: Some(HttpAuthentication {
                username: Some(SecretKey::new("web", "username")),
                password: Some(SecretKey::new("web", "password")),
                token: None,
            }),
            tuning: None,
        }
    }

    #[test]
    fn request_proxy_and_auth() {
        let sink = render(&adapt(&output(http(Some("PUT"))), &Secrets::new()), "output_web");
        assert_eq!(sink["uri"].as_str(), Some("https://logs.example.com/ingest"));
        assert_eq!(sink["method"].as_str(), Some("put"));
        assert_eq!(sink["request"]["timeout_secs"].as_integer(), Some(10));
        assert_eq!(sink["request"]["headers"]["h1"].as_str(), Some("v1"));
        assert_eq!(sink["proxy"]["enabled"].as_bool(), Some(true));
        assert_eq!(sink["proxy"]["https"].as_str(), Some("http://proxy.example.com:3128"));
        assert_eq!(sink["proxy"]["no_proxy"][0].as_str(), Some("localhost"));
        assert_eq!(sink["auth"]["strategy"].as_str(), Some("basic"));
        assert_eq!(sink["tls"]["verify_certificate"].as_bool(), Some(false));
        assert_eq!(sink["tls"]["verify_hostname"].as_bool(), Some(false));
    }

    #[test]
    fn unknown_methods_fall_back_to_post() {
        assert_eq!(http(None).method(), "post");
        assert_eq!(http(Some("CONNECT")).method(), "post");
        assert_eq!(http(Some("Get")).method(), "get");
    }
}
