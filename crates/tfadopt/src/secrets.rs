//! Attributes that `terraform show` never prints and have to be back-filled

use phf::phf_map;

/// Sensitive attributes per logging endpoint block type
static LOGGING_SENSITIVE_FIELDS: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    "logging_bigquery" => &["email", "secret_key"],
    "logging_blobstorage" => &["sas_token"],
    "logging_cloudfiles" => &["access_key"],
    "logging_datadog" => &["token"],
    "logging_digitalocean" => &["access_key", "secret_key"],
    "logging_elasticsearch" => &["password", "tls_client_key"],
    "logging_ftp" => &["password"],
    "logging_gcs" => &["secret_key"],
    "logging_googlepubsub" => &["secret_key"],
    "logging_heroku" => &["token"],
    "logging_honeycomb" => &["token"],
    "logging_https" => &["tls_client_key"],
    "logging_kafka" => &["password", "tls_client_key"],
    "logging_kinesis" => &["access_key", "secret_key"],
    "logging_loggly" => &["token"],
    "logging_logshuttle" => &["token"],
    "logging_newrelic" => &["token"],
    "logging_openstack" => &["access_key"],
    "logging_s3" => &["s3_access_key", "s3_secret_key"],
    "logging_scalyr" => &["token"],
    "logging_sftp" => &["password", "secret_key"],
    "logging_splunk" => &["tls_client_key", "token"],
    "logging_syslog" => &["tls_client_key"],
};

/// Client certificate attributes of a backend, only set when non-empty
pub const BACKEND_SENSITIVE_FIELDS: &[&str] = &["ssl_client_cert", "ssl_client_key"];

/// Sensitive attributes of a logging endpoint, empty for endpoints without any
pub fn logging_sensitive_fields(endpoint_type: &str) -> &'static [&'static str] {
    LOGGING_SENSITIVE_FIELDS
        .get(endpoint_type)
        .copied()
        .unwrap_or_default()
}
