//! # adsoap - helpers autour du transport SOAP
//!
//! Ce crate regroupe la logique écrite à la main qui entoure les contrats
//! générés de l'API publicitaire :
//!
//! - [`create_stream_context`] : fusion des options de connexion d'un appel
//! - [`parse_array_of_string`], [`parse_array_of_int`],
//!   [`parse_array_of_long`] : lecture des fragments `ArrayOf*` que le
//!   désérialiseur générique ne sait pas lier
//! - [`fix_namespace`] : correction des préfixes d'espace de noms d'une
//!   réponse brute
//! - [`Dumper`] : archivage des échanges bruts pour diagnostic
//!
//! ## Example
//!
//! ```no_run
//! use adsoap::{Dumper, RecordedExchange, fix_namespace, parse_array_of_string};
//!
//! let keywords = parse_array_of_string("<K><Items>a</Items><Items>b</Items></K>")?;
//! assert_eq!(keywords, Some(vec!["a".to_string(), "b".to_string()]));
//!
//! let fixed = fix_namespace("<p:R xmlns:p=\"API\"/>", "API");
//!
//! let dumper = Dumper::new("/var/tmp/soap-dumps")?;
//! let exchange = RecordedExchange::new()
//!     .with_request("POST /v4/soap HTTP/1.1", "<request/>")
//!     .with_response("HTTP/1.1 200 OK\r\nRequestId: abc123", "<response/>");
//! dumper.dump_last_request(&exchange)?;
//! # Ok::<(), adsoap::AdSoapError>(())
//! ```

pub mod context;
pub mod dumper;
pub mod errors;
pub mod exchange;
pub mod fragment;
pub mod namespace;

#[cfg(feature = "adsoapconfig")]
pub mod config_ext;

pub use context::{
    ConnectionOptions, ContextParam, HttpOptions, NotificationCallback, OptionValue,
    SectionOptions, StreamContext, create_stream_context,
};
pub use dumper::{Dumper, extract_request_id};
pub use errors::{AdSoapError, Result};
pub use exchange::{LastExchange, RecordedExchange};
pub use fragment::{parse_array_of_int, parse_array_of_long, parse_array_of_string};
pub use namespace::fix_namespace;

#[cfg(feature = "adsoapconfig")]
pub use config_ext::AdSoapConfigExt;
