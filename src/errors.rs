use std::fmt;

#[derive(Debug, Clone)]
pub enum ClicktrailError {
    Config(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    Transaction(String),
    Validation(String),
    NotFound(String),
    InvalidToken(String),
    Serialization(String),
    Reporter(String),
}

impl ClicktrailError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ClicktrailError::Config(_) => "E001",
            ClicktrailError::DatabaseConfig(_) => "E002",
            ClicktrailError::DatabaseConnection(_) => "E003",
            ClicktrailError::DatabaseOperation(_) => "E004",
            ClicktrailError::Transaction(_) => "E005",
            ClicktrailError::Validation(_) => "E006",
            ClicktrailError::NotFound(_) => "E007",
            ClicktrailError::InvalidToken(_) => "E008",
            ClicktrailError::Serialization(_) => "E009",
            ClicktrailError::Reporter(_) => "E010",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            ClicktrailError::Config(_) => "Configuration Error",
            ClicktrailError::DatabaseConfig(_) => "Database Configuration Error",
            ClicktrailError::DatabaseConnection(_) => "Database Connection Error",
            ClicktrailError::DatabaseOperation(_) => "Database Operation Error",
            ClicktrailError::Transaction(_) => "Transaction Error",
            ClicktrailError::Validation(_) => "Validation Error",
            ClicktrailError::NotFound(_) => "Resource Not Found",
            ClicktrailError::InvalidToken(_) => "Invalid Token",
            ClicktrailError::Serialization(_) => "Serialization Error",
            ClicktrailError::Reporter(_) => "Reporter Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            ClicktrailError::Config(msg) => msg,
            ClicktrailError::DatabaseConfig(msg) => msg,
            ClicktrailError::DatabaseConnection(msg) => msg,
            ClicktrailError::DatabaseOperation(msg) => msg,
            ClicktrailError::Transaction(msg) => msg,
            ClicktrailError::Validation(msg) => msg,
            ClicktrailError::NotFound(msg) => msg,
            ClicktrailError::InvalidToken(msg) => msg,
            ClicktrailError::Serialization(msg) => msg,
            ClicktrailError::Reporter(msg) => msg,
        }
    }

    /// 格式化为彩色输出（用于 Server 模式）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出（用于 CLI 模式）
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for ClicktrailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for ClicktrailError {}

// 便捷的构造函数
impl ClicktrailError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        ClicktrailError::Config(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        ClicktrailError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        ClicktrailError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        ClicktrailError::DatabaseOperation(msg.into())
    }

    pub fn transaction<T: Into<String>>(msg: T) -> Self {
        ClicktrailError::Transaction(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        ClicktrailError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        ClicktrailError::NotFound(msg.into())
    }

    pub fn invalid_token<T: Into<String>>(msg: T) -> Self {
        ClicktrailError::InvalidToken(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        ClicktrailError::Serialization(msg.into())
    }

    pub fn reporter<T: Into<String>>(msg: T) -> Self {
        ClicktrailError::Reporter(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for ClicktrailError {
    fn from(err: sea_orm::DbErr) -> Self {
        ClicktrailError::DatabaseOperation(err.to_string())
    }
}

impl From<std::io::Error> for ClicktrailError {
    fn from(err: std::io::Error) -> Self {
        ClicktrailError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ClicktrailError {
    fn from(err: serde_json::Error) -> Self {
        ClicktrailError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for ClicktrailError {
    fn from(err: url::ParseError) -> Self {
        ClicktrailError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClicktrailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ClicktrailError::config("x").code(), "E001");
        assert_eq!(ClicktrailError::transaction("x").code(), "E005");
        assert_eq!(ClicktrailError::reporter("x").code(), "E010");
    }

    #[test]
    fn test_format_simple() {
        let err = ClicktrailError::not_found("tracking definition abc");
        assert_eq!(
            err.format_simple(),
            "Resource Not Found: tracking definition abc"
        );
        assert_eq!(err.to_string(), err.format_simple());
    }

    #[test]
    fn test_from_db_err() {
        let err: ClicktrailError = sea_orm::DbErr::Custom("boom".to_string()).into();
        assert!(matches!(err, ClicktrailError::DatabaseOperation(_)));
        assert!(err.message().contains("boom"));
    }

    #[test]
    fn test_from_url_parse_error() {
        let err: ClicktrailError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, ClicktrailError::Validation(_)));
    }
}
