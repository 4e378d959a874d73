/// The four remote calls the assistant can make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Chat,
    Translate,
    Image,
    Speech,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Chat => "chat",
            Operation::Translate => "translate",
            Operation::Image => "image",
            Operation::Speech => "speech",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_names() {
        assert_eq!(Operation::Chat.as_str(), "chat");
        assert_eq!(Operation::Speech.as_str(), "speech");
    }
}
