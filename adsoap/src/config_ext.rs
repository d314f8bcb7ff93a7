//! Extension pour intégrer les helpers SOAP dans adsoapconfig
//!
//! Ce module fournit le trait `AdSoapConfigExt` qui construit les
//! composants (contexte de connexion, archiveur) à partir de
//! `adsoapconfig::Config`.

use crate::context::{HttpOptions, StreamContext, create_stream_context};
use crate::dumper::Dumper;
use crate::namespace::fix_namespace;
use adsoapconfig::Config;
use anyhow::{Context, Result};
use serde_yaml::Value;

/// Trait d'extension de `adsoapconfig::Config`
///
/// # Exemple
///
/// ```rust,ignore
/// use adsoapconfig::Config;
/// use adsoap::AdSoapConfigExt;
///
/// let config = Config::load_config("")?;
/// let context = config.build_stream_context(HttpOptions::new(), None)?;
/// if let Some(dumper) = config.dumper_if_enabled()? {
///     dumper.dump_last_request(&client)?;
/// }
/// ```
pub trait AdSoapConfigExt {
    /// Options `http` configurées sous `transport.http`
    fn get_http_overlay(&self) -> Result<HttpOptions>;

    /// Construit un contexte : options configurées puis `extra`, les
    /// en-têtes de `extra` venant après ceux de la configuration
    fn build_stream_context(
        &self,
        extra: HttpOptions,
        base: Option<&StreamContext>,
    ) -> Result<StreamContext>;

    /// Crée un archiveur sur le répertoire `dumper.directory`
    fn create_dumper(&self) -> Result<Dumper>;

    /// Comme [`create_dumper`](AdSoapConfigExt::create_dumper), seulement si
    /// `dumper.enabled` est vrai
    fn dumper_if_enabled(&self) -> Result<Option<Dumper>>;

    /// Corrige les préfixes d'une réponse pour l'espace de noms `api.namespace`
    fn fix_response_namespace(&self, xml: &str) -> String;
}

impl AdSoapConfigExt for Config {
    fn get_http_overlay(&self) -> Result<HttpOptions> {
        match self.get_transport_section("http") {
            Value::Null => Ok(HttpOptions::new()),
            value => serde_yaml::from_value(value).context("Invalid transport.http options"),
        }
    }

    fn build_stream_context(
        &self,
        extra: HttpOptions,
        base: Option<&StreamContext>,
    ) -> Result<StreamContext> {
        let configured = create_stream_context(self.get_http_overlay()?, base);
        Ok(create_stream_context(extra, Some(&configured)))
    }

    fn create_dumper(&self) -> Result<Dumper> {
        let dir = self.get_dump_dir()?;
        Dumper::new(&dir).with_context(|| format!("Cannot use dump directory {}", dir.display()))
    }

    fn dumper_if_enabled(&self) -> Result<Option<Dumper>> {
        if self.get_dumper_enabled()? {
            self.create_dumper().map(Some)
        } else {
            Ok(None)
        }
    }

    fn fix_response_namespace(&self, xml: &str) -> String {
        fix_namespace(xml, &self.get_api_namespace())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{HEADER_KEY, HTTP_SECTION, OptionValue};

    fn load(dir: &std::path::Path, vars: Vec<(&str, &str)>) -> Config {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>();
        Config::load_config_with_overrides(dir.to_str().unwrap(), vars).unwrap()
    }

    #[test]
    fn test_http_overlay_from_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = load(temp.path(), vec![]);

        let overlay = config.get_http_overlay().unwrap();
        assert_eq!(
            overlay.get("protocol_version"),
            Some(&OptionValue::Text("1.1".to_string()))
        );
    }

    #[test]
    fn test_build_stream_context_appends_extra_headers() {
        let temp = tempfile::tempdir().unwrap();
        let config = load(temp.path(), vec![]);

        let mut extra = HttpOptions::new();
        extra.insert(HEADER_KEY.to_string(), OptionValue::from("Client-Login: foo"));

        let ctx = config.build_stream_context(extra, None).unwrap();
        assert_eq!(ctx.header_lines(), vec!["Accept: text/xml", "Client-Login: foo"]);
        assert!(ctx.section(HTTP_SECTION).unwrap().contains_key("protocol_version"));
    }

    #[test]
    fn test_dumper_if_enabled() {
        let temp = tempfile::tempdir().unwrap();

        let config = load(temp.path(), vec![]);
        assert!(config.dumper_if_enabled().unwrap().is_none());

        let config = load(temp.path(), vec![("ADSOAP_CONFIG__DUMPER__ENABLED", "true")]);
        let dumper = config.dumper_if_enabled().unwrap().unwrap();
        assert_eq!(dumper.root_dir(), temp.path().join("dumps"));
        assert!(dumper.root_dir().is_dir());
    }
}
