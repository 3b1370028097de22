use aws_config::SdkConfig;
use log::info;

use crate::error::ConfigError;
use super::clients::sns::SnsModule;
use super::clients::sqs::SqsModule;

/// Loads the shared SDK configuration from the environment, optionally pinning
/// the region.
pub async fn get_aws_config(region_override: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region_override {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    loader.load().await
}

/// Checks that an endpoint override is an absolute URL, e.g. a LocalStack
/// address such as `http://localhost:4566`.
pub fn parse_endpoint(endpoint: &str) -> Result<String, ConfigError> {
    url::Url::parse(endpoint).map_err(|source| ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        source,
    })?;
    Ok(endpoint.to_string())
}

/// Builds an SQS client. No request is sent here.
pub fn sqs_client(config: &SdkConfig, endpoint: Option<&str>) -> Result<SqsModule, ConfigError> {
    let mut builder = aws_sdk_sqs::config::Builder::from(config);
    if let Some(endpoint) = endpoint {
        let endpoint = parse_endpoint(endpoint)?;
        info!("Using SQS endpoint override {}", endpoint);
        builder = builder.endpoint_url(endpoint);
    }
    Ok(SqsModule::new(aws_sdk_sqs::Client::from_conf(builder.build())))
}

pub fn sns_client(config: &SdkConfig, endpoint: Option<&str>) -> Result<SnsModule, ConfigError> {
    let mut builder = aws_sdk_sns::config::Builder::from(config);
    if let Some(endpoint) = endpoint {
        let endpoint = parse_endpoint(endpoint)?;
        info!("Using SNS endpoint override {}", endpoint);
        builder = builder.endpoint_url(endpoint);
    }
    Ok(SnsModule::new(aws_sdk_sns::Client::from_conf(builder.build())))
}
