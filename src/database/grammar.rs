//! SQL dialect details the query builder needs: identifier quoting and
//! placeholder syntax.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Grammar {
    MySql,     // `col`, ?
    Postgres,  // "col", $1
    Sqlite,    // "col", ?
    SqlServer, // [col], ?
}

impl Grammar {
    /// The grammar for a configured driver name.
    pub fn for_driver(driver: &str) -> Option<Self> {
        match driver {
            "mysql"              => Some(Self::MySql),
            "pgsql" | "postgres" => Some(Self::Postgres),
            "sqlite"             => Some(Self::Sqlite),
            "mssql"              => Some(Self::SqlServer),
            _                    => None,
        }
    }

    /// Quotes a possibly dotted identifier: `users.id` becomes `"users"."id"`.
    /// `*` segments stay bare.
    pub fn wrap(self, identifier: &str) -> String {
        identifier
            .split('.')
            .map(|segment| self.wrap_segment(segment.trim()))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn wrap_segment(self, segment: &str) -> String {
        if segment == "*" {
            return segment.to_owned();
        }
        match self {
            Self::MySql                   => format!("`{}`", segment.replace('`', "``")),
            Self::Postgres | Self::Sqlite => format!("\"{}\"", segment.replace('"', "\"\"")),
            Self::SqlServer               => format!("[{}]", segment.replace(']', "]]")),
        }
    }

    /// The placeholder for the `index`-th binding, counting from 1.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            _              => "?".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_per_dialect() {
        assert_eq!(Grammar::MySql.wrap("users.id"), "`users`.`id`");
        assert_eq!(Grammar::Postgres.wrap("users.*"), "\"users\".*");
        assert_eq!(Grammar::SqlServer.wrap("name"), "[name]");
        assert_eq!(Grammar::Postgres.wrap("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn placeholders() {
        assert_eq!(Grammar::MySql.placeholder(3), "?");
        assert_eq!(Grammar::Postgres.placeholder(3), "$3");
    }

    #[test]
    fn driver_names() {
        assert_eq!(Grammar::for_driver("pgsql"), Some(Grammar::Postgres));
        assert_eq!(Grammar::for_driver("oracle"), None);
    }
}
