//! Public STUN servers that answer classic RFC 3489 binding requests.

use rand::seq::SliceRandom;

pub const STUN_SERVERS: &[&str] = &[
    "stun.avigora.com",
    "iphone-stun.strato-iphone.de",
    "numb.viagenie.ca",
    "stun.12connect.com",
    "stun.12voip.com",
    "stun.1und1.de",
    "stun.3clogic.com",
    "stun.3cx.com",
    "stun.a-mm.tv",
    "stun.aa.net.uk",
    "stun.acrobits.cz",
    "stun.actionvoip.com",
    "stun.advfn.com",
    "stun.aeta-audio.com",
    "stun.aeta.com",
    "stun.altar.com.pl",
    "stun.avigora.fr",
    "stun.b2b2c.ca",
    "stun.bahnhof.net",
    "stun.barracuda.com",
    "stun.bluesip.net",
    "stun.botonakis.com",
    "stun.budgetsip.com",
    "stun.cablenet-as.net",
    "stun.callromania.ro",
    "stun.callwithus.com",
    "stun.cheapvoip.com",
    "stun.ciktel.com",
    "stun.cloopen.com",
    "stun.commpeak.com",
    "stun.comtube.com",
    "stun.comtube.ru",
    "stun.cope.es",
    "stun.counterpath.com",
    "stun.counterpath.net",
    "stun.cryptonit.net",
    "stun.demos.ru",
    "stun.dus.net",
    "stun.easycall.pl",
    "stun.easyvoip.com",
    "stun.ekiga.net",
    "stun.epygi.com",
    "stun.etoilediese.fr",
    "stun.faktortel.com.au",
    "stun.freecall.com",
    "stun.freeswitch.org",
    "stun.freevoipdeal.com",
    "stun.gmx.de",
    "stun.gmx.net",
    "stun.gradwell.com",
    "stun.halonet.pl",
    "stun.hoiio.com",
    "stun.hosteurope.de",
    "stun.ideasip.com",
    "stun.infra.net",
    "stun.internetcalls.com",
    "stun.intervoip.com",
    "stun.ippi.fr",
    "stun.ipshka.com",
    "stun.irian.at",
    "stun.it1.hr",
    "stun.ivao.aero",
    "stun.jumblo.com",
    "stun.justvoip.com",
    "stun.linphone.org",
    "stun.liveo.fr",
    "stun.lowratevoip.com",
    "stun.lundimatin.fr",
    "stun.mit.de",
    "stun.miwifi.com",
    "stun.modulus.gr",
    "stun.myvoiptraffic.com",
    "stun.mywatson.it",
    "stun.netappel.com",
    "stun.nfon.net",
    "stun.noc.ams-ix.net",
    "stun.node4.co.uk",
    "stun.nonoh.net",
    "stun.nottingham.ac.uk",
    "stun.nova.is",
    "stun.ooma.com",
    "stun.ozekiphone.com",
    "stun.personal-voip.de",
    "stun.phone.com",
    "stun.pjsip.org",
    "stun.poivy.com",
    "stun.powervoip.com",
    "stun.ppdi.com",
    "stun.rackco.com",
    "stun.rockenstein.de",
    "stun.rolmail.net",
    "stun.rynga.com",
    "stun.schlund.de",
    "stun.services.mozilla.com",
    "stun.sigmavoip.com",
    "stun.sip.us",
    "stun.sipdiscount.com",
    "stun.sipgate.net",
    "stun.siplogin.de",
    "stun.sipnet.net",
    "stun.sipnet.ru",
    "stun.siportal.it",
    "stun.sippeer.dk",
    "stun.siptraffic.com",
    "stun.sma.de",
    "stun.smartvoip.com",
    "stun.smsdiscount.com",
    "stun.snafu.de",
    "stun.solcon.nl",
    "stun.solnet.ch",
    "stun.sonetel.com",
    "stun.sonetel.net",
    "stun.speedy.com.ar",
    "stun.srce.hr",
    "stun.ssl7.net",
    "stun.stunprotocol.org",
    "stun.t-online.de",
    "stun.tel.lu",
    "stun.telbo.com",
    "stun.tng.de",
    "stun.twt.it",
    "stun.uls.co.za",
    "stun.usfamily.net",
    "stun.vipgroup.net",
    "stun.viva.gr",
    "stun.vivox.com",
    "stun.vo.lu",
    "stun.voicetrading.com",
    "stun.voip.aebc.com",
    "stun.voip.blackberry.com",
    "stun.voip.eutelia.it",
    "stun.voiparound.com",
    "stun.voipblast.com",
    "stun.voipbuster.com",
    "stun.voipbusterpro.com",
    "stun.voipcheap.co.uk",
    "stun.voipcheap.com",
    "stun.voipfibre.com",
    "stun.voipgain.com",
    "stun.voipgate.com",
    "stun.voipinfocenter.com",
    "stun.voipplanet.nl",
    "stun.voippro.com",
    "stun.voipraider.com",
    "stun.voipstunt.com",
    "stun.voipwise.com",
    "stun.voipzoom.com",
    "stun.voxgratia.org",
    "stun.voxox.com",
    "stun.voztele.com",
    "stun.webcalldirect.com",
    "stun.xtratelecom.es",
    "stun.zadarma.com",
    "stun.zoiper.com",
    "stun1.faktortel.com.au",
];

/// Picks one of [`STUN_SERVERS`] uniformly at random.
pub fn random_stun_server() -> &'static str {
    STUN_SERVERS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(STUN_SERVERS[0])
}
