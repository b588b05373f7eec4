//! Mail and cutscene texts.

use crate::core::progress::{BeatId, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageTemplate {
    pub from: &'static str,
    pub subject: &'static str,
    /// `<username>` is replaced with the player's identity.
    pub body: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub id: MessageId,
    pub from: &'static str,
    pub subject: &'static str,
    pub body: String,
}

pub fn message_template(id: MessageId) -> MessageTemplate {
    match id {
        MessageId::Rector1 => MessageTemplate {
            from: "rector@tul.cz",
            subject: "!URGENT! University under attack",
            body: "TUL is under attack! A rival university has shattered our infrastructure with a\n\
                   botnet. Our best IT specialist is doing what he can, but he got stuck.\n\
                   He will help you as much as he can.\n\n\
                   Help me <username>, you're my only hope...\n\n\
                   Desperately,\n\nRector",
        },
        MessageId::ItExpert1 => MessageTemplate {
            from: "itexpert@tul.cz",
            subject: "botnet",
            body: "Hello <username>,\n\n\
                   I don't like to admit it, but I'm lost. The attack is coming from this address:\n\
                   174.156.12.4. We have to find the device that is the source and delete the\n\
                   botnet script. They have a nasty firewall though, we need to get rid of it first.\n\
                   This should work once you are connected:\n\n\
                   UPDATE Firewall\nSET status = 'inactive'\nWHERE level = 1",
        },
        MessageId::ItExpert2 => MessageTemplate {
            from: "itexpert@tul.cz",
            subject: "firewall",
            body: "Sorry, forgot to tell you... The firewall is password protected. I haven't found\n\
                   the password yet. Maybe there are hints in files on the lab PCs.\n\
                   Try getting onto a PC with the default username \"student\"...",
        },
        MessageId::ItExpert3 => MessageTemplate {
            from: "itexpert@tul.cz",
            subject: "notes",
            body: "One more thing. All my notes are yours now. List them with:\n\n\
                   SELECT id, title\nFROM Hints\n\n\
                   and read one with:\n\n\
                   SELECT text\nFROM Hints\nWHERE id = <id of the note>\n\n\
                   Good luck, youngster!",
        },
        MessageId::ItExpert4 => MessageTemplate {
            from: "itexpert@tul.cz",
            subject: "next step",
            body: "Wow, good job. Meanwhile I tried to break into one of the routers. No luck yet.\n\
                   If you pull it off, we get the network logs.\n\n\
                   Also, the firewall is multi-level. I'm afraid we'll have to switch off\n\
                   every layer...",
        },
        MessageId::ItExpert5 => MessageTemplate {
            from: "itexpert@tul.cz",
            subject: "next step",
            body: "You're doing great! We can read the network logs now. They should show a\n\
                   device that behaves suspiciously. That might be our botnet-spreading friend...\n\n\
                   Let's go, you've got this!",
        },
        MessageId::ItExpert6 => MessageTemplate {
            from: "itexpert@tul.cz",
            subject: "firewall level 4",
            body: "The botnet corrupted the last level of the firewall. It set the password to\n\
                   the number of directories with NULL content on the local PC that its source\n\
                   sent the last PING to...",
        },
        MessageId::ItExpert7 => MessageTemplate {
            from: "itexpert@tul.cz",
            subject: "The Files",
            body: "Yes! You found it!\n\n\
                   There's a load of files on that PC. One of them has to be the botnet script.\n\
                   Be careful: deleting any other file could get us sued...",
        },
    }
}

pub fn render_message(id: MessageId, identity: Option<&str>) -> RenderedMessage {
    let template = message_template(id);
    RenderedMessage {
        id,
        from: template.from,
        subject: template.subject,
        body: template
            .body
            .replace("<username>", identity.unwrap_or("stranger")),
    }
}

pub fn cutscene_text(id: BeatId) -> &'static str {
    match id {
        BeatId::Intro => {
            "Saturday evening. You're sitting in your cozy bedroom, enjoying a well deserved rest.\n\
             The rain drizzles outside in time with your favorite music. The scent of freshly\n\
             brewed tea fills the air.\n ... \n\n Suddenly, a notification interrupts your thoughts..."
        }
        BeatId::NarrativeBridge => {
            "This really wasn't your plan for Saturday evening, but as the rector said: you're\n\
             their only hope...\n\n*sigh* \"Looks like I have no choice...\""
        }
        BeatId::FirewallWarning => {
            "\"Great. So the IT expert is lost, and they want ME to figure it out... Whatever.\"\n\n\
             You take one last look outside, and then you fire up a terminal. Laser focused."
        }
        BeatId::StudentFound => {
            "You search through the database and there it is: the default student credentials,\n\
             hidden in plain sight.\n\n*whispers* \"student\"... of course."
        }
        BeatId::RouterUnlock => {
            "The router's defenses crumble under your command.\n\nRouter access granted.\n\n\
             The network logs are now within your reach."
        }
        BeatId::InfectedFound => {
            "There it is. Buried in the network logs, a single machine behaving suspiciously.\n\
             Unusual traffic. Constant outbound connections. Data leaving in bursts."
        }
        BeatId::Victory => {
            "With surgical precision, you delete the malicious script.\n\nThe infection dies.\n\n\
             The botnet falls silent.\n\nAll across the TUL network, systems stabilize.\n\
             You did it. Against all odds, you saved the university."
        }
    }
}
