//! The "actual lines" catalog: every route in the static timetable, loaded
//! once at startup rather than queried per-request. Backs `/api/all_lines`
//! and `/api/single_line`, which have no counterpart in the reference
//! pipeline's web server — see the design note in §9 about a one-shot
//! catalog being the sanctioned exception to "no process-wide singletons".

use alerts_core::projector::line_number_for_sorting;
use alerts_core::store::RouteMetadata;

#[derive(Debug, Clone)]
pub struct LinesCatalog {
    routes: Vec<RouteMetadata>,
}

impl LinesCatalog {
    pub fn build(mut routes: Vec<RouteMetadata>) -> Self {
        routes.sort_by(|a, b| {
            line_number_for_sorting(&a.line_number)
                .cmp(&line_number_for_sorting(&b.line_number))
                .then_with(|| a.agency_name.cmp(&b.agency_name))
        });
        Self { routes }
    }

    pub fn all(&self) -> &[RouteMetadata] {
        &self.routes
    }

    pub fn by_route_id(&self, route_id: &str) -> Option<&RouteMetadata> {
        self.routes.iter().find(|r| r.route_id == route_id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: &str, line_number: &str) -> RouteMetadata {
        RouteMetadata {
            route_id: id.to_string(),
            route_desc: None,
            agency_id: "A1".to_string(),
            line_number: line_number.to_string(),
            agency_name: "Agency One".to_string(),
        }
    }

    #[test]
    fn build_sorts_numerically_by_line_number() {
        let catalog = LinesCatalog::build(vec![route("r12", "12"), route("r5", "5"), route("rA", "A")]);
        let ids: Vec<&str> = catalog.all().iter().map(|r| r.route_id.as_str()).collect();
        assert_eq!(ids, vec!["rA", "r5", "r12"]);
    }

    #[test]
    fn by_route_id_finds_existing_route() {
        let catalog = LinesCatalog::build(vec![route("r1", "1")]);
        assert!(catalog.by_route_id("r1").is_some());
        assert!(catalog.by_route_id("missing").is_none());
    }
}
