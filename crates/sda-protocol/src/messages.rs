//! The closed set of wire message kinds, named `SENDER_RECEIVER_PURPOSE`
//! after the original naming convention.

/// Every message kind the overlay must register at startup. Values are
/// stable wire codes; reordering variants does not change encoded messages
/// since the discriminant is explicit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageKind {
    // Control
    AllAllParameters = 0,
    AllAllShutdown = 1,
    RelTruTellRateChange = 2,

    // Setup
    CliRelTellPkAndEphPk = 10,
    RelTruTellClientsPksAndEphPksAndBase = 11,
    TruRelTellNewBaseAndEphPks = 12,
    RelTruTellTranscript = 13,
    TruRelShuffleSig = 14,
    RelCliTellEphPksAndTrusteesSig = 15,
    TruRelTellPk = 16,

    // Per-round
    CliRelUpstreamData = 20,
    CliRelOpenClosedData = 21,
    TruRelDcCipher = 22,
    RelCliDownstreamData = 23,
    RelCliDownstreamDataUdp = 24,

    // Disruption / blame
    RelCliDisruptedRound = 30,
    CliRelDisruptionBlame = 31,
    RelAllDisruptionReveal = 32,
    CliRelDisruptionReveal = 33,
    TruRelDisruptionReveal = 34,
    RelAllDisruptionSecret = 35,
    CliRelDisruptionSecret = 36,
    TruRelDisruptionSecret = 37,
}

impl MessageKind {
    /// All kinds, in the order the overlay registers them at startup.
    pub const ALL: &'static [MessageKind] = &[
        Self::AllAllParameters,
        Self::AllAllShutdown,
        Self::RelTruTellRateChange,
        Self::CliRelTellPkAndEphPk,
        Self::RelTruTellClientsPksAndEphPksAndBase,
        Self::TruRelTellNewBaseAndEphPks,
        Self::RelTruTellTranscript,
        Self::TruRelShuffleSig,
        Self::RelCliTellEphPksAndTrusteesSig,
        Self::TruRelTellPk,
        Self::CliRelUpstreamData,
        Self::CliRelOpenClosedData,
        Self::TruRelDcCipher,
        Self::RelCliDownstreamData,
        Self::RelCliDownstreamDataUdp,
        Self::RelCliDisruptedRound,
        Self::CliRelDisruptionBlame,
        Self::RelAllDisruptionReveal,
        Self::CliRelDisruptionReveal,
        Self::TruRelDisruptionReveal,
        Self::RelAllDisruptionSecret,
        Self::CliRelDisruptionSecret,
        Self::TruRelDisruptionSecret,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AllAllParameters => "ALL_ALL_PARAMETERS",
            Self::AllAllShutdown => "ALL_ALL_SHUTDOWN",
            Self::RelTruTellRateChange => "REL_TRU_TELL_RATE_CHANGE",
            Self::CliRelTellPkAndEphPk => "CLI_REL_TELL_PK_AND_EPH_PK",
            Self::RelTruTellClientsPksAndEphPksAndBase => {
                "REL_TRU_TELL_CLIENTS_PKS_AND_EPH_PKS_AND_BASE"
            }
            Self::TruRelTellNewBaseAndEphPks => "TRU_REL_TELL_NEW_BASE_AND_EPH_PKS",
            Self::RelTruTellTranscript => "REL_TRU_TELL_TRANSCRIPT",
            Self::TruRelShuffleSig => "TRU_REL_SHUFFLE_SIG",
            Self::RelCliTellEphPksAndTrusteesSig => "REL_CLI_TELL_EPH_PKS_AND_TRUSTEES_SIG",
            Self::TruRelTellPk => "TRU_REL_TELL_PK",
            Self::CliRelUpstreamData => "CLI_REL_UPSTREAM_DATA",
            Self::CliRelOpenClosedData => "CLI_REL_OPENCLOSED_DATA",
            Self::TruRelDcCipher => "TRU_REL_DC_CIPHER",
            Self::RelCliDownstreamData => "REL_CLI_DOWNSTREAM_DATA",
            Self::RelCliDownstreamDataUdp => "REL_CLI_DOWNSTREAM_DATA_UDP",
            Self::RelCliDisruptedRound => "REL_CLI_DISRUPTED_ROUND",
            Self::CliRelDisruptionBlame => "CLI_REL_DISRUPTION_BLAME",
            Self::RelAllDisruptionReveal => "REL_ALL_DISRUPTION_REVEAL",
            Self::CliRelDisruptionReveal => "CLI_REL_DISRUPTION_REVEAL",
            Self::TruRelDisruptionReveal => "TRU_REL_DISRUPTION_REVEAL",
            Self::RelAllDisruptionSecret => "REL_ALL_DISRUPTION_SECRET",
            Self::CliRelDisruptionSecret => "CLI_REL_DISRUPTION_SECRET",
            Self::TruRelDisruptionSecret => "TRU_REL_DISRUPTION_SECRET",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
