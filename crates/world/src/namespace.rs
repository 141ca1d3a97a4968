//! Pure namespacing of world-scoped variable names: `"{world}.{speaker}.{name}"`.
//! Keeps a speaker's per-world variables from colliding inside their single
//! kernel memory partition.

use kernel::SpeakerId;

pub fn namespaced(world: &str, speaker: SpeakerId, name: &str) -> String {
    format!("{world}.{speaker}.{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_world_speaker_name() {
        assert_eq!(namespaced("classroom", 3, "grade"), "classroom.3.grade");
    }
}
