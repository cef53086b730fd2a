// In crates/notifier/src/message.rs

use chrono::{DateTime, Utc};
use core_types::{Direction, Symbol};

/// Everything that goes into one alert mail. Rendering is plain string
/// assembly so the exact wording is testable without a mail server.
#[derive(Debug, Clone)]
pub struct AlertMail<'a> {
    pub symbol: &'a Symbol,
    pub direction: Direction,
    pub price: f64,
    pub dma: f64,
    pub period: u32,
    pub at: DateTime<Utc>,
    /// Resolved chart link for this symbol, if one is configured.
    pub chart_url: Option<&'a str>,
}

impl AlertMail<'_> {
    fn condition(&self) -> &'static str {
        match self.direction {
            Direction::Above => "crossed above",
            Direction::Below => "crossed below",
            Direction::None => "touched",
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "ALERT: {} {} {} DMA",
            self.symbol,
            self.condition(),
            self.period
        )
    }

    pub fn text_body(&self) -> String {
        let mut body = format!(
            "Stock Alert: {symbol}\n\
             ------------------------\n\
             Price has {condition} the {period} DMA.\n\
             \n\
             Price: ${price:.2}\n\
             DMA: ${dma:.2}\n\
             Time: {time}\n",
            symbol = self.symbol,
            condition = self.condition(),
            period = self.period,
            price = self.price,
            dma = self.dma,
            time = self.at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
        if let Some(url) = self.chart_url {
            body.push_str(&format!("\nView chart: {url}\n"));
        }
        body
    }

    pub fn html_body(&self) -> String {
        let chart_link = match self.chart_url {
            Some(url) => format!(
                r#"<p><a href="{url}" style="background-color: #1976d2; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px;">View chart</a></p>"#
            ),
            None => String::new(),
        };
        format!(
            r#"<html>
  <body style="font-family: Arial, sans-serif;">
    <h2 style="color: #d32f2f;">Stock Alert: {symbol}</h2>
    <p><strong>{symbol}</strong> has {condition} its <strong>{period} DMA</strong>.</p>
    <ul>
      <li><strong>Current price:</strong> ${price:.2}</li>
      <li><strong>DMA level:</strong> ${dma:.2}</li>
      <li><strong>Time:</strong> {time}</li>
    </ul>
    {chart_link}
  </body>
</html>"#,
            symbol = self.symbol,
            condition = self.condition(),
            period = self.period,
            price = self.price,
            dma = self.dma,
            time = self.at.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}
