use crate::events::IncidentKind;
use crate::feed::Incident;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Hash over the fields of an incident that change while it is ongoing.
///
/// Identity fields (`id`, `title`, `link`, `updated`) are excluded: a feed
/// bumping `updated` without touching the content is not an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(incident: &Incident) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(incident.status.as_bytes());
        hasher.update([0x1f]);
        hasher.update(incident.summary.as_bytes());
        hasher.update([0x1f]);
        for component in &incident.components {
            hasher.update(component.name.as_bytes());
            hasher.update([0x1e]);
        }
        Self(hasher.finalize().into())
    }
}

/// Per-provider record of every incident id seen and its last fingerprint.
#[derive(Debug, Default)]
pub struct IncidentDiff {
    seen: HashSet<String>,
    fingerprints: HashMap<String, Fingerprint>,
}

impl IncidentDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every incident as already known, without classifying any.
    pub fn seed(&mut self, incidents: &[Incident]) {
        for incident in incidents {
            self.seen.insert(incident.id.clone());
            self.fingerprints
                .insert(incident.id.clone(), Fingerprint::of(incident));
        }
    }

    /// Classifies each incident in document order and records the result.
    ///
    /// Returns only incidents that are new or updated; unchanged ones are
    /// dropped and leave no trace in the state.
    pub fn apply(&mut self, incidents: Vec<Incident>) -> Vec<(Incident, IncidentKind)> {
        let mut changes = Vec::new();
        for incident in incidents {
            let fingerprint = Fingerprint::of(&incident);

            if self.seen.insert(incident.id.clone()) {
                self.fingerprints.insert(incident.id.clone(), fingerprint);
                changes.push((incident, IncidentKind::New));
            } else if self.fingerprints.get(&incident.id) != Some(&fingerprint) {
                self.fingerprints.insert(incident.id.clone(), fingerprint);
                changes.push((incident, IncidentKind::Updated));
            }
        }
        changes
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn fingerprint(&self, id: &str) -> Option<&Fingerprint> {
        self.fingerprints.get(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Component;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn incident(id: &str, status: &str) -> Incident {
        Incident {
            id: id.to_string(),
            title: format!("Incident {id}"),
            status: status.to_string(),
            updated: Utc::now(),
            link: format!("https://status.example.com/incidents/{id}"),
            summary: "Elevated error rates".to_string(),
            components: vec![Component {
                name: "API".to_string(),
                status: "Degraded".to_string(),
            }],
            provider: "Example".to_string(),
        }
    }

    fn kinds(changes: &[(Incident, IncidentKind)]) -> Vec<(&str, IncidentKind)> {
        changes
            .iter()
            .map(|(inc, kind)| (inc.id.as_str(), *kind))
            .collect()
    }

    #[test]
    fn test_fingerprint_ignores_identity_fields() {
        let a = incident("1", "Investigating");
        let mut b = a.clone();
        b.id = "2".into();
        b.title = "Other".into();
        b.link = String::new();
        b.updated = a.updated + chrono::Duration::hours(1);
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn test_fingerprint_tracks_volatile_fields() {
        let base = incident("1", "Investigating");

        let mut status = base.clone();
        status.status = "Resolved".into();
        assert_ne!(Fingerprint::of(&base), Fingerprint::of(&status));

        let mut summary = base.clone();
        summary.summary = "Recovered".into();
        assert_ne!(Fingerprint::of(&base), Fingerprint::of(&summary));

        let mut components = base.clone();
        components.components.push(Component {
            name: "Chat".into(),
            status: String::new(),
        });
        assert_ne!(Fingerprint::of(&base), Fingerprint::of(&components));
    }

    #[test]
    fn test_fingerprint_field_boundaries() {
        let mut a = incident("1", "ab");
        a.summary = "c".into();
        let mut b = incident("1", "a");
        b.summary = "bc".into();
        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn test_seed_emits_nothing_afterwards() {
        let mut diff = IncidentDiff::new();
        let feed = vec![incident("1", "Resolved"), incident("2", "Resolved")];
        diff.seed(&feed);

        assert_eq!(diff.len(), 2);
        assert!(diff.is_seen("1") && diff.is_seen("2"));
        assert!(diff.apply(feed).is_empty());
    }

    #[test]
    fn test_unseen_id_is_new() {
        let mut diff = IncidentDiff::new();
        diff.seed(&[incident("1", "Resolved")]);

        let changes = diff.apply(vec![incident("2", "Investigating"), incident("1", "Resolved")]);
        assert_eq!(kinds(&changes), vec![("2", IncidentKind::New)]);
        assert!(diff.is_seen("2"));
        assert!(diff.apply(vec![incident("2", "Investigating")]).is_empty());
    }

    #[test]
    fn test_status_change_is_one_update() {
        let mut diff = IncidentDiff::new();
        let original = incident("1", "Investigating");
        diff.seed(std::slice::from_ref(&original));
        let before = *diff.fingerprint("1").unwrap();

        let resolved = incident("1", "Resolved");
        let changes = diff.apply(vec![resolved.clone()]);
        assert_eq!(kinds(&changes), vec![("1", IncidentKind::Updated)]);
        assert_ne!(diff.fingerprint("1"), Some(&before));
        assert_eq!(diff.fingerprint("1"), Some(&Fingerprint::of(&resolved)));

        assert!(diff.apply(vec![resolved]).is_empty());
    }

    #[test]
    fn test_document_order_preserved() {
        let mut diff = IncidentDiff::new();
        diff.seed(&[incident("b", "Investigating")]);

        let changes = diff.apply(vec![
            incident("c", "Investigating"),
            incident("b", "Monitoring"),
            incident("a", "Investigating"),
        ]);
        assert_eq!(
            kinds(&changes),
            vec![
                ("c", IncidentKind::New),
                ("b", IncidentKind::Updated),
                ("a", IncidentKind::New),
            ]
        );
    }

    #[test]
    fn test_empty_diff() {
        let mut diff = IncidentDiff::new();
        assert!(diff.is_empty());
        assert!(diff.apply(Vec::new()).is_empty());
        assert!(diff.fingerprint("missing").is_none());
    }
}
