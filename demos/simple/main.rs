use appconfiguration::{AppConfiguration, AttributeValue, Attributes, Configuration};

pub fn main() {
    env_logger::init();

    let region = std::env::var("APPCONFIG_REGION")
        .unwrap_or_else(|_| AppConfiguration::REGION_US_SOUTH.to_owned());
    let guid = std::env::var("APPCONFIG_GUID").unwrap();
    let apikey = std::env::var("APPCONFIG_APIKEY").unwrap();
    let collection_id = std::env::var("APPCONFIG_COLLECTION_ID").unwrap();
    let environment_id = std::env::var("APPCONFIG_ENVIRONMENT_ID").unwrap();

    let mut client = AppConfiguration::new();
    client.init(&region, &guid, &apikey).unwrap();
    client
        .set_context(&collection_id, &environment_id, None, true)
        .unwrap();

    // Until this call returns, the client returns None for all features and properties.
    client.wait_for_configuration().unwrap();

    client
        .register_configuration_update_listener(|configuration: &Configuration| {
            println!("Configuration updated: {} features", configuration.features().len());
        })
        .unwrap();

    let attributes = Attributes::from([("email".to_owned(), AttributeValue::from("alice@ibm.com"))]);
    for (feature_id, feature) in client.get_features().unwrap_or_default() {
        println!(
            "{feature_id}: {:?}",
            feature.get_current_value("alice", &attributes)
        );
    }
}
