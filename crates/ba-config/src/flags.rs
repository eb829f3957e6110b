bitflags::bitflags! {
    /// CVar flag bits (spec §4.10; bit layout recovered from the original
    /// `ConVar.h`, which pins this at exactly 8 bits).
    #[derive(Default)]
    pub struct CvarFlags: u8 {
        /// Mutable from the client console.
        const CLIENT = 1 << 0;
        /// Pushed by the server; overrides the client value while set.
        const SERVER = 1 << 1;
        /// Pushed by the active skin; overrides the client value while set.
        const SKINS = 1 << 2;
        /// Resets to its default value in multiplayer, regardless of any
        /// server/skin/client value that would otherwise apply.
        const PROTECTED = 1 << 3;
        /// Affects gameplay/scoring; surfaced to replay/score validation.
        const GAMEPLAY = 1 << 4;
        /// Not listed by console enumeration commands.
        const HIDDEN = 1 << 5;
        /// Never written to the persisted config file.
        const NOSAVE = 1 << 6;
        /// Never read from the persisted config file.
        const NOLOAD = 1 << 7;
        /// `HIDDEN | NOSAVE | NOLOAD`: a cvar that exists purely in memory
        /// for the current process.
        const CONSTANT = Self::HIDDEN.bits | Self::NOSAVE.bits | Self::NOLOAD.bits;
    }
}
