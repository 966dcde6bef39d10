use super::operators::{
    AgencyIdentificationOperator, DuplicateOperator, HtmlOperator, MiscMetadataOperator, Operator,
    Probe404Operator, ProbeOperator, RecordTypeOperator, RelevancyOperator, RootUrlOperator,
    SubmitApprovedOperator,
};
use crate::config::{Config, TaskConfig};
use crate::error::Result;
use crate::external::{
    AgencyIdentifier, DataSourcesApi, DataSourcesClient, HttpAgencyIdentifier,
    HttpRecordTypeClassifier, HttpRelevancyClassifier, RecordTypeClassifier, RelevancyClassifier,
};
use crate::probe::{HttpRequestInterface, RequestInterface};
use crate::store::UrlStore;
use std::sync::Arc;
use tracing::debug;

/// Outside services the operators call
#[derive(Clone)]
pub struct Collaborators {
    pub requests: Arc<dyn RequestInterface>,
    pub data_sources: Option<Arc<dyn DataSourcesApi>>,
    pub record_type: Option<Arc<dyn RecordTypeClassifier>>,
    pub agency: Option<Arc<dyn AgencyIdentifier>>,
    pub relevancy: Option<Arc<dyn RelevancyClassifier>>,
}

impl Collaborators {
    /// Only the request interface; service-backed operators stay unloaded
    pub fn new(requests: Arc<dyn RequestInterface>) -> Self {
        Self {
            requests,
            data_sources: None,
            record_type: None,
            agency: None,
            relevancy: None,
        }
    }

    pub fn with_data_sources(mut self, api: Arc<dyn DataSourcesApi>) -> Self {
        self.data_sources = Some(api);
        self
    }

    pub fn with_record_type(mut self, classifier: Arc<dyn RecordTypeClassifier>) -> Self {
        self.record_type = Some(classifier);
        self
    }

    pub fn with_agency(mut self, identifier: Arc<dyn AgencyIdentifier>) -> Self {
        self.agency = Some(identifier);
        self
    }

    pub fn with_relevancy(mut self, classifier: Arc<dyn RelevancyClassifier>) -> Self {
        self.relevancy = Some(classifier);
        self
    }

    /// HTTP collaborators for every service with a configured endpoint
    pub fn from_config(config: &Config) -> Result<Self> {
        let services = &config.services;
        let mut collaborators = Self::new(Arc::new(HttpRequestInterface::new(&config.probe)?));

        if let Some(url) = services.data_sources_url.as_deref() {
            collaborators = collaborators.with_data_sources(Arc::new(DataSourcesClient::new(
                url,
                config.data_sources_api_key(),
                services.data_sources_rate_limit,
            )?));
        }
        if let Some(url) = services.record_type_classifier_url.as_deref() {
            collaborators =
                collaborators.with_record_type(Arc::new(HttpRecordTypeClassifier::new(url)?));
        }
        if let Some(url) = services.agency_identifier_url.as_deref() {
            collaborators = collaborators.with_agency(Arc::new(HttpAgencyIdentifier::new(url)?));
        }
        if let Some(url) = services.relevancy_classifier_url.as_deref() {
            collaborators =
                collaborators.with_relevancy(Arc::new(HttpRelevancyClassifier::new(url)?));
        }
        Ok(collaborators)
    }
}

/// Resolves the operator list for each cycle
pub struct OperatorLoader {
    store: UrlStore,
    config: TaskConfig,
    collaborators: Collaborators,
}

impl OperatorLoader {
    pub fn new(store: UrlStore, config: TaskConfig, collaborators: Collaborators) -> Self {
        Self {
            store,
            config,
            collaborators,
        }
    }

    pub fn from_config(config: &Config, store: UrlStore) -> Result<Self> {
        Ok(Self::new(
            store,
            config.tasks.clone(),
            Collaborators::from_config(config)?,
        ))
    }

    /// Enabled operators in their fixed run order.
    ///
    /// Operators whose collaborator is not configured are left out.
    pub fn load_operators(&self) -> Vec<Operator> {
        let enabled = &self.config.enabled;
        let store = &self.store;
        let batch_size = self.config.batch_size;
        let requests = &self.collaborators.requests;
        let mut operators = Vec::new();

        if enabled.probe {
            operators.push(Operator::Probe(ProbeOperator::new(
                store.clone(),
                requests.clone(),
                batch_size,
            )));
        }
        if enabled.html {
            operators.push(Operator::Html(HtmlOperator::new(
                store.clone(),
                requests.clone(),
                batch_size,
            )));
        }
        if enabled.duplicate {
            match &self.collaborators.data_sources {
                Some(api) => operators.push(Operator::Duplicate(DuplicateOperator::new(
                    store.clone(),
                    api.clone(),
                    batch_size,
                ))),
                None => debug!("Skipping duplicate operator: no data-sources API configured"),
            }
        }
        if enabled.probe_404 {
            operators.push(Operator::Probe404(Probe404Operator::new(
                store.clone(),
                requests.clone(),
                batch_size,
                self.config.probe_404_window_days,
            )));
        }
        if enabled.record_type {
            match &self.collaborators.record_type {
                Some(classifier) => operators.push(Operator::RecordType(RecordTypeOperator::new(
                    store.clone(),
                    classifier.clone(),
                    batch_size,
                ))),
                None => debug!("Skipping record_type operator: no classifier configured"),
            }
        }
        if enabled.agency_identification {
            match &self.collaborators.agency {
                Some(identifier) => operators.push(Operator::AgencyIdentification(
                    AgencyIdentificationOperator::new(store.clone(), identifier.clone(), batch_size),
                )),
                None => {
                    debug!("Skipping agency_identification operator: no identifier configured")
                }
            }
        }
        if enabled.root_url {
            operators.push(Operator::RootUrl(RootUrlOperator::new(
                store.clone(),
                batch_size,
            )));
        }
        if enabled.misc_metadata {
            operators.push(Operator::MiscMetadata(MiscMetadataOperator::new(
                store.clone(),
                batch_size,
            )));
        }
        if enabled.submit_approved {
            match &self.collaborators.data_sources {
                Some(api) => operators.push(Operator::SubmitApproved(SubmitApprovedOperator::new(
                    store.clone(),
                    api.clone(),
                    batch_size,
                ))),
                None => debug!("Skipping submit_approved operator: no data-sources API configured"),
            }
        }
        if enabled.relevancy {
            match &self.collaborators.relevancy {
                Some(classifier) => operators.push(Operator::Relevancy(RelevancyOperator::new(
                    store.clone(),
                    classifier.clone(),
                    batch_size,
                ))),
                None => debug!("Skipping relevancy operator: no classifier configured"),
            }
        }

        operators
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mock::{KeywordClassifier, MockAgencyIdentifier, MockDataSources};
    use crate::probe::mock::MockRequestInterface;
    use crate::store::tests::setup_test_store;
    use crate::tasks::{TaskOperator, TaskType};

    fn types(operators: &[Operator]) -> Vec<TaskType> {
        operators.iter().map(|o| o.task_type()).collect()
    }

    #[tokio::test]
    async fn test_full_operator_order() {
        let (store, _tmp) = setup_test_store().await;
        let collaborators = Collaborators::new(Arc::new(MockRequestInterface::default()))
            .with_data_sources(Arc::new(MockDataSources::default()))
            .with_record_type(Arc::new(KeywordClassifier))
            .with_agency(Arc::new(MockAgencyIdentifier::default()))
            .with_relevancy(Arc::new(KeywordClassifier));
        let loader = OperatorLoader::new(store, TaskConfig::default(), collaborators);

        assert_eq!(
            types(&loader.load_operators()),
            vec![
                TaskType::Probe,
                TaskType::Html,
                TaskType::Duplicate,
                TaskType::Probe404,
                TaskType::RecordType,
                TaskType::AgencyIdentification,
                TaskType::RootUrl,
                TaskType::MiscMetadata,
                TaskType::SubmitApproved,
                TaskType::Relevancy,
            ]
        );
    }

    #[tokio::test]
    async fn test_toggles_and_missing_services_drop_operators() {
        let (store, _tmp) = setup_test_store().await;
        let mut config = TaskConfig::default();
        config.enabled.html = false;
        config.enabled.root_url = false;
        let loader = OperatorLoader::new(
            store,
            config,
            Collaborators::new(Arc::new(MockRequestInterface::default())),
        );

        assert_eq!(
            types(&loader.load_operators()),
            vec![TaskType::Probe, TaskType::Probe404, TaskType::MiscMetadata]
        );
    }
}
