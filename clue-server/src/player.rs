//! 玩家管理

use rand::Rng;

use protocol::{GameError, PlayerId, PlayerInfo, Suspect, MAX_NICKNAME_LEN};

/// 大厅中的玩家
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    /// 选择的角色（开始游戏前可为空）
    pub character: Option<Suspect>,
    /// 是否在线
    pub connected: bool,
    /// 重新加入凭证，只发给本人
    token: String,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            is_host: false,
            character: None,
            connected: true,
            token: Self::generate_token(),
        }
    }

    /// 128 位随机凭证（十六进制）
    fn generate_token() -> String {
        format!("{:032x}", rand::thread_rng().gen::<u128>())
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn verify_token(&self, token: &str) -> bool {
        self.token == token
    }

    /// 验证并规范化昵称（去掉首尾空白）
    pub fn validate_name(name: &str) -> Result<String, GameError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::InvalidName("name must not be empty"));
        }
        if name.chars().count() > MAX_NICKNAME_LEN {
            return Err(GameError::InvalidName("name is longer than 20 characters"));
        }
        Ok(name.to_string())
    }

    /// 对外展示的信息
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            player_id: self.id,
            name: self.name.clone(),
            is_host: self.is_host,
            character: self.character,
            connected: self.connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert_eq!(Player::validate_name("  Alice ").unwrap(), "Alice");
        assert_eq!(Player::validate_name("侦探").unwrap(), "侦探");

        // 空昵称
        assert!(Player::validate_name("").is_err());
        assert!(Player::validate_name("   ").is_err());

        // 超长昵称
        let long_name = "a".repeat(21);
        assert!(Player::validate_name(&long_name).is_err());
        let max_name = "侦".repeat(20);
        assert!(Player::validate_name(&max_name).is_ok());
    }

    #[test]
    fn test_info() {
        let mut player = Player::new(7, "Bob".to_string());
        player.character = Some(Suspect::Green);

        let info = player.info();
        assert_eq!(info.player_id, 7);
        assert_eq!(info.character, Some(Suspect::Green));
        assert!(info.connected);
        assert!(!info.is_host);
    }

    #[test]
    fn test_token() {
        let alice = Player::new(1, "Alice".to_string());
        let bob = Player::new(2, "Bob".to_string());
        assert_eq!(alice.token().len(), 32);
        assert_ne!(alice.token(), bob.token());

        assert!(alice.verify_token(alice.token()));
        assert!(!alice.verify_token(bob.token()));
        assert!(!alice.verify_token(""));

        // 凭证不出现在公开信息中
        let json = serde_json::to_string(&alice.info()).unwrap();
        assert!(!json.contains(alice.token()));
    }
}
