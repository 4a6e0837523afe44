//! Column vocabularies. Each enum's string form is what lands in SQLite and
//! on the wire.

// ── Parties ───────────────────────────────────────────────────────────

string_enum! {
    pub enum EntityType("entity type") {
        Company => "company",
        Individual => "individual",
        Employee => "employee",
    }
}

string_enum! {
    pub enum PartnerStatus("partner status") {
        Prospect => "prospect",
        Active => "active",
        Inactive => "inactive",
        Terminated => "terminated",
    }
}

string_enum! {
    pub enum PartnerType("partner type") {
        WhiteLabel => "white_label",
        SelfServe => "self_serve",
        D2b => "d2b",
        Reseller => "reseller",
    }
}

string_enum! {
    pub enum RelationshipType("relationship type") {
        Contact => "contact",
        AccountManager => "account_manager",
        Client => "client",
        ReferredBy => "referred_by",
    }
}

string_enum! {
    pub enum RelationshipSubtype("relationship subtype") {
        Primary => "primary",
        Admin => "admin",
        Billing => "billing",
        Technical => "technical",
    }
}

string_enum! {
    pub enum ContactType("contact type") {
        Email => "email",
        Phone => "phone",
        Address => "address",
    }
}

string_enum! {
    pub enum CampaignStatus("campaign status") {
        Prospect => "prospect",
        Onboarding => "onboarding",
        Active => "active",
        Paused => "paused",
        Offboarding => "offboarding",
        Cancelled => "cancelled",
    }
}

// ── Catalog ───────────────────────────────────────────────────────────

string_enum! {
    /// Whether a service item or package recurs monthly or is delivered once.
    pub enum ServiceType("service type") {
        Ongoing => "ongoing",
        OneTime => "one_time",
    }
}

string_enum! {
    pub enum ServiceScope("service scope") {
        Campaign => "campaign",
        Partner => "partner",
        Internal => "internal",
    }
}

string_enum! {
    /// How a service item may appear on a package proposal. `Neither` marks
    /// items that are only offered as action items.
    pub enum ProposalMode("proposal mode") {
        Recurring => "recurring",
        OneTime => "one_time",
        Both => "both",
        Neither => "neither",
    }
}

impl ProposalMode {
    /// Whether an item with this mode can be added to a package of `package_type`.
    pub fn fits_package(&self, package_type: ServiceType) -> bool {
        match package_type {
            ServiceType::OneTime => matches!(self, Self::OneTime | Self::Both),
            ServiceType::Ongoing => matches!(self, Self::Recurring | Self::Both),
        }
    }
}

// ── Permissions ───────────────────────────────────────────────────────

string_enum! {
    pub enum PermissionState("permission state") {
        Allowed => "allowed",
        AllowedWithApproval => "allowed_with_approval",
        NotAllowed => "not_allowed",
    }
}

string_enum! {
    pub enum ScopeStatus("scope status") {
        InScope => "in_scope",
        NotInScope => "not_in_scope",
    }
}

// ── Task templates ────────────────────────────────────────────────────

string_enum! {
    pub enum TaskTemplateType("task template type") {
        PartnerOnboarding => "partner_onboarding",
        CampaignOnboarding => "campaign_onboarding",
        CampaignTask => "campaign_task",
        PartnerTask => "partner_task",
        Internal => "internal",
    }
}

string_enum! {
    pub enum PrimaryParticipant("primary participant") {
        CampaignManager => "campaign_manager",
        AccountManager => "account_manager",
        AccountExecutive => "account_executive",
        Discovery => "discovery",
        Partner => "partner",
        Strategist => "strategist",
        Specialist => "specialist",
        ReportingSpecialist => "reporting_specialist",
    }
}

string_enum! {
    pub enum TaskGrouping("grouping") {
        CoAdmin => "co_admin",
        CoPlans => "co_plans",
        CoReporting => "co_reporting",
        CoInitialWork => "co_initial_work",
        PoGoodFit => "po_good_fit",
        PoExpectations => "po_expectations",
        PoAdmin => "po_admin",
        PoHandoff => "po_handoff",
    }
}

string_enum! {
    pub enum TemplateCategory("template category") {
        Default => "default",
        PartnerSpecific => "partner_specific",
        CampaignProfileSpecific => "campaign_profile_specific",
        PartnerCampaignProfileSpecific => "partner_campaign_profile_specific",
    }
}

// ── Access items ──────────────────────────────────────────────────────

string_enum! {
    pub enum AccessItemOwner("access item owner") {
        Partner => "partner",
        Internal => "internal",
    }
}

string_enum! {
    pub enum TfaType("2FA type") {
        Sms => "sms",
        Email => "email",
        Authenticator => "authenticator",
        Other => "other",
    }
}

string_enum! {
    pub enum TfaSource("2FA source") {
        Internal => "internal",
        Partner => "partner",
    }
}

// ── Notes ─────────────────────────────────────────────────────────────

string_enum! {
    pub enum NoteEntityType("note entity type") {
        Partner => "partner",
        Campaign => "campaign",
        Employee => "employee",
        Individual => "individual",
        ActionItem => "action_item",
        ActionItemTemplate => "action_item_template",
        Packages => "packages",
        CampaignProfile => "campaign_profile",
        Task => "task",
    }
}

string_enum! {
    pub enum NoteType("note type") {
        Context => "context",
        General => "general",
        Access => "access",
        Permissions => "permissions",
        Feedback => "feedback",
        Rule => "rule",
        Process => "process",
        Template => "template",
        Onboarding => "onboarding",
        Discovery => "discovery",
        Reporting => "reporting",
        Publishing => "publishing",
    }
}

// ── Activity log ──────────────────────────────────────────────────────

string_enum! {
    pub enum ActivityType("activity type") {
        PartnerCreated => "partner_created",
        PartnerUpdated => "partner_updated",
        ProspectCreated => "prospect_created",
        CampaignCreated => "campaign_created",
        CampaignUpdated => "campaign_updated",
        PackageCreated => "package_created",
        PackageUpdated => "package_updated",
        PackageDeleted => "package_deleted",
        PackageNoteAdded => "package_note_added",
        CreatedTemplate => "created_template",
        UpdatedTemplate => "updated_template",
        DeletedTemplate => "deleted_template",
    }
}

string_enum! {
    pub enum RelatedTable("related table") {
        Partners => "partners",
        Entities => "entities",
        Campaigns => "campaigns",
        Employees => "employees",
        TaskTemplates => "task_templates",
        CampaignProfiles => "campaign_profiles",
        ServiceItems => "service_items",
        ServiceCategories => "service_categories",
        Packages => "packages",
    }
}
