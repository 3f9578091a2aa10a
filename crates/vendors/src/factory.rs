//! Adapter factory.
//!
//! Adapters are built fresh per sync attempt and discarded; the shared
//! services they borrow (session pool, site configs, domain cache, PDF
//! extractor) are created once at daemon start and passed in explicitly.

use std::sync::Arc;

use common::Vendor;

use crate::adapter::{AdapterCore, VendorAdapter};
use crate::adapters::{
    berkeley::BerkeleyAdapter, chicago::ChicagoAdapter, civicclerk::CivicClerkAdapter,
    civicengage::CivicEngageAdapter, civicplus::CivicPlusAdapter, escribe::EscribeAdapter,
    granicus::GranicusAdapter, iqm2::Iqm2Adapter, legistar::LegistarAdapter,
    menlopark::MenloParkAdapter, municode::MunicodeAdapter, novusagenda::NovusAgendaAdapter,
    onbase::OnBaseAdapter, primegov::PrimeGovAdapter,
};
use crate::discovery::DomainCache;
use crate::error::VendorError;
use crate::pdf::PdfTextExtractor;
use crate::session::SessionPool;
use crate::sites::SiteConfigs;

/// Process-wide services adapters depend on.
#[derive(Clone)]
pub struct AdapterDeps {
    pub sessions: Arc<SessionPool>,
    pub sites: Arc<SiteConfigs>,
    pub domains: Arc<DomainCache>,
    /// The NYC Legistar instance requires an API token.
    pub nyc_legistar_token: Option<String>,
    pub pdf_extractor: Option<Arc<dyn PdfTextExtractor>>,
}

impl AdapterDeps {
    pub fn new(sessions: Arc<SessionPool>, sites: Arc<SiteConfigs>) -> Self {
        Self {
            sessions,
            sites,
            domains: Arc::new(DomainCache::new()),
            nyc_legistar_token: None,
            pdf_extractor: None,
        }
    }

    pub fn with_nyc_legistar_token(mut self, token: Option<String>) -> Self {
        self.nyc_legistar_token = token;
        self
    }

    pub fn with_pdf_extractor(mut self, extractor: Arc<dyn PdfTextExtractor>) -> Self {
        self.pdf_extractor = Some(extractor);
        self
    }
}

/// Build the adapter for a vendor and city slug.
///
/// Configuration problems (missing slug, unconfigured Granicus view id or
/// OnBase site) surface here, never mid-sync.
pub fn build_adapter(
    vendor: Vendor,
    city_slug: &str,
    deps: &AdapterDeps,
) -> Result<Box<dyn VendorAdapter>, VendorError> {
    let core = AdapterCore::new(vendor, city_slug, deps.sessions.clone())?;

    let adapter: Box<dyn VendorAdapter> = match vendor {
        Vendor::Primegov => Box::new(PrimeGovAdapter::new(core)),
        Vendor::Legistar => {
            let token = (city_slug == "nyc")
                .then(|| deps.nyc_legistar_token.clone())
                .flatten();
            Box::new(LegistarAdapter::new(core, token))
        }
        Vendor::Granicus => Box::new(GranicusAdapter::new(core, &deps.sites)?),
        Vendor::CivicClerk => Box::new(CivicClerkAdapter::new(core)),
        Vendor::CivicPlus => Box::new(CivicPlusAdapter::new(core, deps.domains.clone())),
        Vendor::CivicEngage => Box::new(CivicEngageAdapter::new(
            core,
            deps.domains.clone(),
            &deps.sites,
        )),
        Vendor::Escribe => Box::new(EscribeAdapter::new(core)),
        Vendor::Iqm2 => Box::new(Iqm2Adapter::new(core)),
        Vendor::OnBase => Box::new(OnBaseAdapter::new(core, &deps.sites)?),
        Vendor::NovusAgenda => Box::new(NovusAgendaAdapter::new(core)),
        Vendor::Municode => Box::new(MunicodeAdapter::new(core, None)),
        Vendor::Chicago => Box::new(ChicagoAdapter::new(core)),
        Vendor::Berkeley => Box::new(BerkeleyAdapter::new(core)),
        Vendor::MenloPark => Box::new(MenloParkAdapter::new(core, deps.pdf_extractor.clone())),
    };

    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps() -> AdapterDeps {
        AdapterDeps::new(Arc::new(SessionPool::new()), Arc::new(SiteConfigs::default()))
    }

    #[test]
    fn api_vendors_build_without_static_config() {
        for vendor in [
            Vendor::Primegov,
            Vendor::Legistar,
            Vendor::CivicClerk,
            Vendor::Iqm2,
            Vendor::NovusAgenda,
        ] {
            assert!(build_adapter(vendor, "someslug", &deps()).is_ok(), "{vendor}");
        }
    }

    #[test]
    fn static_config_vendors_fail_fast_when_unconfigured() {
        assert!(build_adapter(Vendor::Granicus, "cambridge", &deps()).is_err());
        assert!(build_adapter(Vendor::OnBase, "durhamNC", &deps()).is_err());
    }

    #[test]
    fn empty_slug_is_a_construction_error() {
        assert!(build_adapter(Vendor::Primegov, "", &deps()).is_err());
    }
}
