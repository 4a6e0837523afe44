use crate::TemplateCategory;

/// Derive a task template's category from the scopes it is bound to.
///
/// A zero id is treated the same as an absent one; form posts send `0` for
/// an unselected dropdown.
pub fn derive_template_category(
    partner_entity_id: Option<i64>,
    campaign_profile_id: Option<i64>,
) -> TemplateCategory {
    let has_partner = partner_entity_id.is_some_and(|id| id != 0);
    let has_profile = campaign_profile_id.is_some_and(|id| id != 0);
    match (has_partner, has_profile) {
        (true, true) => TemplateCategory::PartnerCampaignProfileSpecific,
        (true, false) => TemplateCategory::PartnerSpecific,
        (false, true) => TemplateCategory::CampaignProfileSpecific,
        (false, false) => TemplateCategory::Default,
    }
}

/// Normalize a scope id: `Some(0)` becomes `None`.
pub fn scope_id(id: Option<i64>) -> Option<i64> {
    id.filter(|id| *id != 0)
}
